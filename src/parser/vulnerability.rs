//! Component vulnerable-area / probability-of-exposure tables (`.av`).

use super::{split_fields, LineReader};
use crate::error::LoadError;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// A physical sub-part of the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: u32,
    pub position: DVec3,
    pub name: String,
}

impl Component {
    /// Id 0 marks a placeholder entry with no real geometry.
    pub fn is_dummy(&self) -> bool {
        self.id == 0
    }
}

/// How the tables were reduced over attack azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AveragingMode {
    AveragedOverAllAzimuths,
    AveragedOnNonZeroAvs,
    ByAzimuth,
}

impl AveragingMode {
    fn from_flag(flag: i32) -> Option<Self> {
        match flag {
            -1 => Some(Self::AveragedOverAllAzimuths),
            0 => Some(Self::AveragedOnNonZeroAvs),
            1 => Some(Self::ByAzimuth),
            _ => None,
        }
    }

    /// Averaged tables carry a PE line after every AV line.
    pub fn has_pe(&self) -> bool {
        !matches!(self, Self::ByAzimuth)
    }
}

/// Fixed-shape table indexed by (table, azimuth, elevation, mass, velocity).
/// Table `t` belongs to `components[t]`.
#[derive(Debug, Clone)]
pub struct VulnerabilityTable {
    pub components: Vec<Component>,
    /// Target reference location from the file header.
    pub reference_location: DVec3,
    /// Summed x/y of non-dummy components divided by the table count.
    pub average_location: (f64, f64),
    pub averaging: AveragingMode,
    pub azimuths: Vec<f64>,
    pub elevations: Vec<f64>,
    pub velocities: Vec<f64>,
    pub masses: Vec<f64>,
    num_tables: usize,
    table_names: Vec<String>,
    velocity_cutoffs: Vec<Option<f64>>,
    avs: Vec<f64>,
    pes: Vec<f64>,
}

impl VulnerabilityTable {
    fn new(
        components: Vec<Component>,
        reference_location: DVec3,
        average_location: (f64, f64),
        averaging: AveragingMode,
        num_tables: usize,
        axes: [Vec<f64>; 4],
    ) -> Self {
        let [azimuths, elevations, velocities, masses] = axes;
        let cells = num_tables * azimuths.len() * elevations.len();
        let rows = cells * masses.len();
        let values = rows * velocities.len();
        Self {
            components,
            reference_location,
            average_location,
            averaging,
            azimuths,
            elevations,
            velocities,
            masses,
            num_tables,
            table_names: vec![String::new(); cells],
            velocity_cutoffs: vec![None; rows],
            avs: vec![0.0; values],
            pes: vec![0.0; values],
        }
    }

    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    fn cell(&self, table: usize, az: usize, el: usize) -> Option<usize> {
        (table < self.num_tables && az < self.azimuths.len() && el < self.elevations.len())
            .then(|| (table * self.azimuths.len() + az) * self.elevations.len() + el)
    }

    fn row(&self, table: usize, az: usize, el: usize, ms: usize) -> Option<usize> {
        let cell = self.cell(table, az, el)?;
        (ms < self.masses.len()).then(|| cell * self.masses.len() + ms)
    }

    fn row_span(&self, row: usize) -> std::ops::Range<usize> {
        let n = self.velocities.len();
        row * n..(row + 1) * n
    }

    /// AV values across all velocities for one (table, az, el, mass) row.
    pub fn av_velocities(&self, table: usize, az: usize, el: usize, ms: usize) -> Option<&[f64]> {
        let row = self.row(table, az, el, ms)?;
        Some(&self.avs[self.row_span(row)])
    }

    pub fn pe_velocities(&self, table: usize, az: usize, el: usize, ms: usize) -> Option<&[f64]> {
        let row = self.row(table, az, el, ms)?;
        Some(&self.pes[self.row_span(row)])
    }

    pub fn av(&self, table: usize, az: usize, el: usize, ms: usize, vl: usize) -> Option<f64> {
        self.av_velocities(table, az, el, ms)?.get(vl).copied()
    }

    pub fn pe(&self, table: usize, az: usize, el: usize, ms: usize, vl: usize) -> Option<f64> {
        self.pe_velocities(table, az, el, ms)?.get(vl).copied()
    }

    pub fn table_name(&self, table: usize, az: usize, el: usize) -> Option<&str> {
        self.cell(table, az, el)
            .map(|c| self.table_names[c].as_str())
    }

    pub fn velocity_cutoff(&self, table: usize, az: usize, el: usize, ms: usize) -> Option<f64> {
        self.velocity_cutoffs[self.row(table, az, el, ms)?]
    }

    /// Mean AV and PE over every mass and velocity of one (table, az, el) cell.
    pub fn mean_av_pe(&self, table: usize, az: usize, el: usize) -> Option<(f64, f64)> {
        let cell = self.cell(table, az, el)?;
        let per_cell = self.masses.len() * self.velocities.len();
        let span = cell * per_cell..(cell + 1) * per_cell;
        let n = per_cell as f64;
        let av = self.avs[span.clone()].iter().sum::<f64>() / n;
        let pe = self.pes[span].iter().sum::<f64>() / n;
        Some((av, pe))
    }

    /// Copy every row of one cell into another (polar elevations).
    fn copy_cell(&mut self, from: usize, to: usize) {
        let per_cell = self.masses.len() * self.velocities.len();
        let nm = self.masses.len();
        self.avs
            .copy_within(from * per_cell..(from + 1) * per_cell, to * per_cell);
        self.pes
            .copy_within(from * per_cell..(from + 1) * per_cell, to * per_cell);
        self.velocity_cutoffs
            .copy_within(from * nm..(from + 1) * nm, to * nm);
        self.table_names[to] = self.table_names[from].clone();
    }
}

pub fn read_vulnerability(path: &Path, max_bytes: u64) -> Result<VulnerabilityTable, LoadError> {
    let mut reader = LineReader::open(path, max_bytes)?;
    let table = parse_vulnerability(&mut reader)?;
    tracing::info!(
        "read {} vulnerability table(s) from {} ({} az x {} el x {} mass x {} vel)",
        table.num_tables,
        path.display(),
        table.azimuths.len(),
        table.elevations.len(),
        table.masses.len(),
        table.velocities.len()
    );
    Ok(table)
}

pub(crate) fn parse_vulnerability<R: BufRead>(
    reader: &mut LineReader<R>,
) -> Result<VulnerabilityTable, LoadError> {
    let mut table = parse_header(reader)?;
    parse_tables(reader, &mut table)?;
    Ok(table)
}

fn parse_header<R: BufRead>(reader: &mut LineReader<R>) -> Result<VulnerabilityTable, LoadError> {
    reader.skip_lines(2, "AV file title")?;
    let line = reader.expect_line("component count")?;
    let num_comps: usize = reader.parse(line.split_whitespace().next(), "component count")?;
    reader.declared_count(&[num_comps], "component")?;
    reader.skip_lines(3, "tire/leak/fire arrays")?;

    let line = reader.expect_line("target location")?;
    let mut t = line.split_whitespace();
    let reference_location = DVec3::new(
        reader.parse(t.next(), "target x")?,
        reader.parse(t.next(), "target y")?,
        reader.parse(t.next(), "target z")?,
    );

    let mut components = Vec::with_capacity(num_comps);
    let (mut sum_x, mut sum_y) = (0.0, 0.0);
    for _ in 0..num_comps {
        let line = reader.expect_line("component")?;
        let f = split_fields(&line, 5);
        let comp = Component {
            id: reader.parse(f.first().copied(), "component id")?,
            position: DVec3::new(
                reader.parse(f.get(1).copied(), "component x")?,
                reader.parse(f.get(2).copied(), "component y")?,
                reader.parse(f.get(3).copied(), "component z")?,
            ),
            name: f.get(4).copied().unwrap_or("").to_string(),
        };
        if !comp.is_dummy() {
            sum_x += comp.position.x;
            sum_y += comp.position.y;
        }
        components.push(comp);
    }

    reader.skip_lines(1, "AV header")?;
    let line = reader.expect_line("table count and averaging flag")?;
    let mut t = line.split_whitespace();
    let num_tables: usize = reader.parse(t.next(), "table count")?;
    let flag: i32 = reader.parse(t.next(), "averaging flag")?;
    let averaging = AveragingMode::from_flag(flag)
        .ok_or_else(|| reader.error(format!("unknown averaging flag {}", flag)))?;
    if num_tables == 0 || num_tables > num_comps {
        return Err(reader.error(format!(
            "table count {} must be between 1 and the component count {}",
            num_tables, num_comps
        )));
    }
    let average_location = (sum_x / num_tables as f64, sum_y / num_tables as f64);

    let azimuths = reader.read_counted_array("azimuth")?;
    let elevations = reader.read_counted_array("elevation")?;
    let velocities = reader.read_counted_array("velocity")?;
    let masses = reader.read_counted_array("mass")?;
    reader.declared_count(
        &[
            num_tables,
            azimuths.len(),
            elevations.len(),
            velocities.len(),
            masses.len(),
        ],
        "AV value",
    )?;

    Ok(VulnerabilityTable::new(
        components,
        reference_location,
        average_location,
        averaging,
        num_tables,
        [azimuths, elevations, velocities, masses],
    ))
}

fn parse_tables<R: BufRead>(
    reader: &mut LineReader<R>,
    table: &mut VulnerabilityTable,
) -> Result<(), LoadError> {
    let by_azimuth = table.averaging == AveragingMode::ByAzimuth;
    let (n_az, n_el) = (table.azimuths.len(), table.elevations.len());
    let (n_ms, n_vl) = (table.masses.len(), table.velocities.len());

    for icmp in 0..table.num_tables {
        for iel in 0..n_el {
            let polar = table.elevations[iel] == 90.0 || table.elevations[iel] == -90.0;
            for iaz in 0..n_az {
                let line = reader.expect_line("table header")?;
                let (az, el, name) = if by_azimuth {
                    let f = split_fields(&line, 3);
                    let az: f64 = reader.parse(f.first().copied(), "table azimuth")?;
                    let el: f64 = reader.parse(f.get(1).copied(), "table elevation")?;
                    (az, el, f.get(2).copied().unwrap_or(""))
                } else {
                    let f = split_fields(&line, 2);
                    let el: f64 = reader.parse(f.first().copied(), "table elevation")?;
                    (table.azimuths[0], el, f.get(1).copied().unwrap_or(""))
                };
                if az != table.azimuths[iaz] {
                    return Err(reader.error(format!(
                        "Azimuth value didn't match appropriate azimuth array value: component {}, azimuth {}.",
                        icmp + 1,
                        iaz + 1
                    )));
                }
                if el != table.elevations[iel] {
                    return Err(reader.error(format!(
                        "Elevation value didn't match appropriate elevation array value: component {}, azimuth {}, elevation {}.",
                        icmp + 1,
                        iaz + 1,
                        iel + 1
                    )));
                }
                let cell = (icmp * n_az + iaz) * n_el + iel;
                table.table_names[cell] = name.to_string();

                for ims in 0..n_ms {
                    let row = cell * n_ms + ims;
                    let span = row * n_vl..(row + 1) * n_vl;
                    let where_ = format!(
                        "component {}, azimuth {}, elevation {}, mass {}",
                        icmp + 1,
                        iaz + 1,
                        iel + 1,
                        ims + 1
                    );

                    let line = reader.expect_line("AV line")?;
                    let tokens: Vec<&str> = line.split_whitespace().collect();
                    let ms: f64 = reader.parse(tokens.first().copied(), "mass")?;
                    if ms != table.masses[ims] {
                        return Err(reader.error(format!(
                            "Mass value didn't match appropriate mass array value: {}.",
                            where_
                        )));
                    }
                    if tokens.len() < n_vl + 2 {
                        return Err(reader.error(format!(
                            "expected {} AV values: {}.",
                            n_vl, where_
                        )));
                    }
                    for (ivl, slot) in table.avs[span.clone()].iter_mut().enumerate() {
                        let av = reader.parse_finite(Some(tokens[ivl + 2]), "AV")?;
                        if av < 0.0 {
                            return Err(reader.error(format!(
                                "Bad fragment AV: {}, velocity {}.",
                                where_,
                                ivl + 1
                            )));
                        }
                        *slot = av;
                    }
                    if tokens.len() > n_vl + 2 {
                        table.velocity_cutoffs[row] =
                            Some(reader.parse(tokens.get(n_vl + 3).copied(), "velocity cutoff")?);
                    }

                    if table.averaging.has_pe() {
                        let line = reader.expect_line("PE line")?;
                        let tokens: Vec<&str> = line.split_whitespace().collect();
                        if tokens.len() < n_vl + 1 {
                            return Err(reader.error(format!(
                                "expected {} PE values: {}.",
                                n_vl, where_
                            )));
                        }
                        for (ivl, slot) in table.pes[span].iter_mut().enumerate() {
                            let pe: f64 = reader.parse(Some(tokens[ivl + 1]), "PE")?;
                            if !(0.0..=1.0).contains(&pe) {
                                return Err(reader.error(format!(
                                    "Bad fragment PE: {}, velocity {}.",
                                    where_,
                                    ivl + 1
                                )));
                            }
                            *slot = pe;
                        }
                    } else {
                        table.pes[span].fill(1.0);
                    }
                }

                if by_azimuth && polar {
                    // one record covers every azimuth at the pole
                    for rest in iaz + 1..n_az {
                        table.copy_cell(cell, (icmp * n_az + rest) * n_el + iel);
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
AV FILE TITLE
second title
3 1
tire
leak
fire
0.0 0.0 0.0
1 2.0 1.0 0.5 Engine
2 -2.0 3.0 1.0 Crew commander
0 0.0 0.0 0.0 dummy
AV HEADER
";

    fn parse(text: &str) -> Result<VulnerabilityTable, LoadError> {
        let mut r = LineReader::from_text("t.av", text);
        parse_vulnerability(&mut r)
    }

    fn by_azimuth_two_velocities() -> String {
        format!(
            "{}2 1\n1 0\n1 45\n2 100 200\n1 0.5\n\
             0 45 ENGINE\n0.5 0 1.5 2.5\n\
             0 45 CREW\n0.5 0 0.0 4.0\n",
            HEADER
        )
    }

    #[test]
    fn two_components_single_cell() {
        let t = parse(&by_azimuth_two_velocities()).unwrap();
        assert_eq!(t.num_tables(), 2);
        assert_eq!(t.components.len(), 3);
        assert_eq!(t.components[1].name, "Crew commander");
        let avs = t.av_velocities(0, 0, 0, 0).unwrap();
        assert_eq!(avs.len(), 2);
        assert!(avs.iter().all(|v| *v >= 0.0));
        assert_eq!(t.av(1, 0, 0, 0, 1), Some(4.0));
        assert_eq!(t.pe(0, 0, 0, 0, 0), Some(1.0));
        assert_eq!(t.table_name(1, 0, 0), Some("CREW"));
        assert_eq!(t.average_location, (0.0, 2.0));
        assert_eq!(t.av(2, 0, 0, 0, 0), None);
    }

    #[test]
    fn negative_av_is_rejected() {
        let text = by_azimuth_two_velocities().replace("0.5 0 0.0 4.0", "0.5 0 0.0 -4.0");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("Bad fragment AV: component 2"));
    }

    #[test]
    fn nan_av_is_rejected() {
        for token in ["NaN", "inf"] {
            let text = by_azimuth_two_velocities()
                .replace("0.5 0 0.0 4.0", &format!("0.5 0 0.0 {}", token));
            let err = parse(&text).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::FormatViolation);
            assert!(err.to_string().contains("non-finite AV"), "{}", token);
        }
    }

    #[test]
    fn oversized_component_count_is_format_error() {
        let text = HEADER.replace("3 1\ntire", "18446744073709551615 1\ntire");
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("t.av:3"));
        assert!(err.to_string().contains("component count"));
    }

    #[test]
    fn axis_mismatch_names_indices() {
        let text = by_azimuth_two_velocities().replace("0 45 CREW", "0 40 CREW");
        let err = parse(&text).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::FormatViolation);
        assert!(err
            .to_string()
            .contains("component 2, azimuth 1, elevation 1"));

        let text = by_azimuth_two_velocities().replace("0.5 0 1.5 2.5", "0.25 0 1.5 2.5");
        assert!(parse(&text).unwrap_err().to_string().contains("Mass value"));
    }

    #[test]
    fn averaged_mode_reads_pe_lines() {
        let text = format!(
            "{}1 0\n1 0\n1 30\n1 100\n1 0.5\n\
             30 AVG\n0.5 0 2.0 cutoff 850.0\n0 0.25\n",
            HEADER
        );
        let t = parse(&text).unwrap();
        assert_eq!(t.averaging, AveragingMode::AveragedOnNonZeroAvs);
        assert_eq!(t.pe(0, 0, 0, 0, 0), Some(0.25));
        assert_eq!(t.velocity_cutoff(0, 0, 0, 0), Some(850.0));
        assert_eq!(t.mean_av_pe(0, 0, 0), Some((2.0, 0.25)));

        let bad = text.replace("0 0.25", "0 1.25");
        assert!(parse(&bad).unwrap_err().to_string().contains("Bad fragment PE"));
    }

    #[test]
    fn polar_elevation_reads_one_record() {
        let text = format!(
            "{}1 1\n2 0 90\n1 90\n1 100\n1 0.5\n\
             0 90 TOP\n0.5 0 3.0\n",
            HEADER
        );
        let t = parse(&text).unwrap();
        assert_eq!(t.av(0, 0, 0, 0, 0), Some(3.0));
        assert_eq!(t.av(0, 1, 0, 0, 0), Some(3.0));
        assert_eq!(t.table_name(0, 1, 0), Some("TOP"));
    }

    #[test]
    fn bad_averaging_flag() {
        let text = format!("{}1 7\n", HEADER);
        assert!(parse(&text).unwrap_err().to_string().contains("averaging flag"));
    }
}
