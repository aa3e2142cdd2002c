//! Case manifest (`.out`) reader: run parameters, blast table, and the paths of
//! the dependent files.

use super::{value_after_colon, LineReader};
use crate::error::LoadError;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};

const AV_FILE: &str = "TARGET AV FILE";
const SRF_FILE: &str = "TARGET SURFACE FILE";
const KILL_FILE: &str = "KILL DEFINITION FILE";
const DTL_FILE: &str = "DETAILED OUTPUT FILE";
const TERM_VEL: &str = "TERMINAL VELOCITY";
const BURST_HEIGHT: &str = "BURST HEIGHT";
const ATTACK_AZ_SPECIFIC: &str = "ATTACK AZIMUTH - SPECIFIC";
const ATTACK_AZ_AVERAGED: &str = "ATTACK AZIMUTH - AVERAGED";
const ANGLE_OF_FALL: &str = "ANGLE OF FALL";
const TARGET_CENTER: &str = "TARGET CENTER";
const BLAST_TABLE: &str = "CMPID";
const DIRECT_HIT: &str = "DIRECT HIT COMPONENTS";
const INVULNERABLE: &str = "INVULNERABLE COMPONENTS";
const KILL_DESC: &str = "MATRIX REQUESTED FOR";
const RUN_COMPLETE: &str = "RUN COMPLETE";

const KEYWORDS: [&str; 15] = [
    AV_FILE,
    SRF_FILE,
    KILL_FILE,
    DTL_FILE,
    TERM_VEL,
    BURST_HEIGHT,
    ATTACK_AZ_SPECIFIC,
    ATTACK_AZ_AVERAGED,
    ANGLE_OF_FALL,
    TARGET_CENTER,
    BLAST_TABLE,
    DIRECT_HIT,
    INVULNERABLE,
    KILL_DESC,
    RUN_COMPLETE,
];

fn keyword_of(line: &str) -> Option<&'static str> {
    let l = line.trim_start();
    KEYWORDS.iter().copied().find(|k| l.starts_with(k))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlastShape {
    Sphere,
    /// Lower cylinder, upper cylinder, hemispherical cap.
    DoubleCylinder,
}

/// Blast-kill envelope around one component, relative to the component position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlastVolume {
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub z1: f64,
    pub z2: f64,
}

impl BlastVolume {
    pub fn shape(&self) -> BlastShape {
        if self.r1 == 0.0 || self.r2 == 0.0 || self.z1 == 0.0 {
            BlastShape::Sphere
        } else {
            BlastShape::DoubleCylinder
        }
    }

    pub fn max_radius(&self) -> f64 {
        self.r1.max(self.r2).max(self.r3)
    }
}

/// Everything a completed manifest yields.
#[derive(Debug, Clone)]
pub struct CaseManifest {
    pub manifest_path: PathBuf,
    pub av_file: PathBuf,
    pub srf_file: PathBuf,
    pub kill_file: PathBuf,
    /// Sibling `.mtx`; may not exist.
    pub mtx_file: PathBuf,
    /// Named detail file, or the sibling `.dtl` when it exists.
    pub dtl_file: Option<PathBuf>,
    pub term_vel: Option<f64>,
    pub burst_height: Option<f64>,
    pub attack_az: Option<f64>,
    pub az_averaging: bool,
    pub aof: Option<f64>,
    pub target_center: Option<DVec3>,
    pub blast_volumes: BTreeMap<u32, BlastVolume>,
    pub direct_hit_ids: BTreeSet<u32>,
    pub invulnerable_ids: BTreeSet<u32>,
    pub kill_description: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ManifestOutcome {
    Complete(Box<CaseManifest>),
    /// No completion marker; dependent files must not be read.
    Incomplete,
}

#[derive(Debug, Clone)]
enum PathSlot {
    Named(PathBuf),
    /// Blank value and the fallback scan found no existing path.
    Unresolved,
}

#[derive(Debug, Default)]
struct Scan {
    av: Option<PathSlot>,
    srf: Option<PathSlot>,
    kill: Option<PathSlot>,
    dtl: Option<PathSlot>,
    term_vel: Option<f64>,
    burst_height: Option<f64>,
    attack_az: Option<f64>,
    az_averaging: bool,
    aof: Option<f64>,
    target_center: Option<DVec3>,
    blast_volumes: BTreeMap<u32, BlastVolume>,
    direct_hit_ids: BTreeSet<u32>,
    invulnerable_ids: BTreeSet<u32>,
    kill_description: Option<String>,
    completed: bool,
}

/// Read a manifest from disk. Relative paths inside it resolve against its directory.
pub fn read_manifest(path: &Path, max_bytes: u64) -> Result<ManifestOutcome, LoadError> {
    let mut reader = LineReader::open(path, max_bytes)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let scan = scan_manifest(&mut reader, base)?;
    tracing::debug!(
        "scanned manifest {} (completed: {})",
        path.display(),
        scan.completed
    );
    finish(scan, path)
}

fn resolve(base: &Path, raw: &str) -> PathBuf {
    let p = Path::new(raw);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn scan_manifest<R: BufRead>(reader: &mut LineReader<R>, base: &Path) -> Result<Scan, LoadError> {
    let mut scan = Scan::default();
    while let Some(line) = reader.next_line()? {
        let Some(key) = keyword_of(&line) else {
            continue;
        };
        match key {
            AV_FILE => scan.av = Some(path_value(reader, &line, base)?),
            SRF_FILE => scan.srf = Some(path_value(reader, &line, base)?),
            KILL_FILE => scan.kill = Some(path_value(reader, &line, base)?),
            DTL_FILE => scan.dtl = Some(path_value(reader, &line, base)?),
            TERM_VEL => scan.term_vel = Some(first_number(reader, &line, "terminal velocity")?),
            BURST_HEIGHT => scan.burst_height = Some(first_number(reader, &line, "burst height")?),
            ATTACK_AZ_SPECIFIC => {
                scan.az_averaging = false;
                scan.attack_az = Some(first_number(reader, &line, "attack azimuth")?);
            }
            ATTACK_AZ_AVERAGED => {
                scan.az_averaging = true;
                scan.attack_az = Some(first_number(reader, &line, "attack azimuth")?);
            }
            ANGLE_OF_FALL => scan.aof = Some(first_number(reader, &line, "angle of fall")?),
            TARGET_CENTER => {
                let mut t = value_after_colon(&line).split_whitespace();
                let x = reader.parse(t.next(), "target center x")?;
                let y = reader.parse(t.next(), "target center y")?;
                let z = reader.parse(t.next(), "target center z")?;
                scan.target_center = Some(DVec3::new(x, y, z));
            }
            BLAST_TABLE => read_blast_table(reader, &mut scan.blast_volumes)?,
            DIRECT_HIT => read_ids(reader, &line, &mut scan.direct_hit_ids)?,
            INVULNERABLE => read_ids(reader, &line, &mut scan.invulnerable_ids)?,
            KILL_DESC => {
                if scan.kill_description.is_some() {
                    return Err(reader.error("cannot read multiple matrices in a single case"));
                }
                scan.kill_description = Some(value_after_colon(&line).to_string());
            }
            RUN_COMPLETE => scan.completed = true,
            _ => {}
        }
    }
    Ok(scan)
}

fn first_number<R: BufRead>(
    reader: &LineReader<R>,
    line: &str,
    what: &str,
) -> Result<f64, LoadError> {
    reader.parse(value_after_colon(line).split_whitespace().next(), what)
}

fn read_ids<R: BufRead>(
    reader: &LineReader<R>,
    line: &str,
    into: &mut BTreeSet<u32>,
) -> Result<(), LoadError> {
    for t in value_after_colon(line).split_whitespace() {
        into.insert(reader.parse(Some(t), "component id")?);
    }
    Ok(())
}

/// A filename value; when blank, the following non-blank lines are tried until
/// one names an existing file. A keyword line ends the search.
fn path_value<R: BufRead>(
    reader: &mut LineReader<R>,
    line: &str,
    base: &Path,
) -> Result<PathSlot, LoadError> {
    let raw = value_after_colon(line);
    if !raw.is_empty() {
        return Ok(PathSlot::Named(resolve(base, raw)));
    }
    while let Some(next) = reader.next_line()? {
        let candidate = next.trim();
        if candidate.is_empty() {
            continue;
        }
        if keyword_of(&next).is_some() {
            reader.push_back(next);
            break;
        }
        let p = resolve(base, candidate);
        if p.exists() {
            return Ok(PathSlot::Named(p));
        }
        tracing::debug!("skipping non-existent filename candidate {}", p.display());
    }
    Ok(PathSlot::Unresolved)
}

/// Rows `id r1 r2 r3 z1 z2` until a blank line or a row of another shape.
fn read_blast_table<R: BufRead>(
    reader: &mut LineReader<R>,
    into: &mut BTreeMap<u32, BlastVolume>,
) -> Result<(), LoadError> {
    while let Some(line) = reader.next_line()? {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            break;
        }
        if tokens.len() != 6 || tokens[0].parse::<u32>().is_err() {
            reader.push_back(line);
            break;
        }
        let id: u32 = reader.parse(Some(tokens[0]), "blast component id")?;
        let vol = BlastVolume {
            r1: reader.parse(Some(tokens[1]), "blast r1")?,
            r2: reader.parse(Some(tokens[2]), "blast r2")?,
            r3: reader.parse(Some(tokens[3]), "blast r3")?,
            z1: reader.parse(Some(tokens[4]), "blast z1")?,
            z2: reader.parse(Some(tokens[5]), "blast z2")?,
        };
        if vol.r1 == 0.0 && vol.r2 == 0.0 && vol.z1 == 0.0 {
            // sphere rows carry one extra line
            reader.next_line()?;
        }
        into.insert(id, vol);
    }
    Ok(())
}

fn require(
    slot: Option<PathSlot>,
    artifact: &'static str,
    manifest: &Path,
) -> Result<PathBuf, LoadError> {
    match slot {
        Some(PathSlot::Named(p)) if p.exists() => Ok(p),
        Some(PathSlot::Named(p)) => Err(LoadError::missing(artifact, &p)),
        Some(PathSlot::Unresolved) | None => Err(LoadError::UnnamedFile {
            artifact,
            manifest: manifest.to_path_buf(),
        }),
    }
}

fn finish(scan: Scan, path: &Path) -> Result<ManifestOutcome, LoadError> {
    if !scan.completed {
        return Ok(ManifestOutcome::Incomplete);
    }
    let av_file = require(scan.av, "AV file", path)?;
    let srf_file = require(scan.srf, "surface file", path)?;
    let kill_file = require(scan.kill, "kill definition file", path)?;
    let dtl_file = match scan.dtl {
        Some(PathSlot::Named(p)) if p.exists() => Some(p),
        Some(PathSlot::Named(p)) => return Err(LoadError::missing("detail file", &p)),
        Some(PathSlot::Unresolved) => {
            return Err(LoadError::UnnamedFile {
                artifact: "detail file",
                manifest: path.to_path_buf(),
            })
        }
        None => Some(path.with_extension("dtl")).filter(|p| p.exists()),
    };
    Ok(ManifestOutcome::Complete(Box::new(CaseManifest {
        manifest_path: path.to_path_buf(),
        av_file,
        srf_file,
        kill_file,
        mtx_file: path.with_extension("mtx"),
        dtl_file,
        term_vel: scan.term_vel,
        burst_height: scan.burst_height,
        attack_az: scan.attack_az,
        az_averaging: scan.az_averaging,
        aof: scan.aof,
        target_center: scan.target_center,
        blast_volumes: scan.blast_volumes,
        direct_hit_ids: scan.direct_hit_ids,
        invulnerable_ids: scan.invulnerable_ids,
        kill_description: scan.kill_description,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_case(dir: &Path, body: &str) -> PathBuf {
        for f in ["t.av", "t.srf", "t.kill"] {
            fs::write(dir.join(f), "x").unwrap();
        }
        let p = dir.join("case_a_45-300-0.out");
        fs::write(&p, body).unwrap();
        p
    }

    const FULL: &str = "\
LETHALITY RUN OUTPUT
 TARGET AV FILE: t.av
 TARGET SURFACE FILE: t.srf
 KILL DEFINITION FILE: t.kill
 TERMINAL VELOCITY:   300.0 ft/s
 BURST HEIGHT:  0.0
 ATTACK AZIMUTH - AVERAGED: 45.0 deg
 ANGLE OF FALL: 60.0
 TARGET CENTER: 1.0 2.0 0.5
 DIRECT HIT COMPONENTS: 1 2
 INVULNERABLE COMPONENTS: 6
 some unrelated output line
 CMPID  R1  R2  R3  Z1  Z2
   5  1.0  2.0  3.0  4.0  6.0
   7  0.0  0.0  2.5  0.0  1.0
      Sphere
   8  1.0  1.5  2.0  1.0  3.0

 MATRIX REQUESTED FOR: Mobility kill
 RUN COMPLETE
";

    #[test]
    fn complete_manifest_yields_paths_and_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_case(dir.path(), FULL);
        let ManifestOutcome::Complete(m) = read_manifest(&p, 1 << 20).unwrap() else {
            panic!("expected complete run");
        };
        assert_eq!(m.av_file, dir.path().join("t.av"));
        assert_eq!(m.mtx_file, dir.path().join("case_a_45-300-0.mtx"));
        assert!(m.dtl_file.is_none());
        assert_eq!(m.term_vel, Some(300.0));
        assert_eq!(m.attack_az, Some(45.0));
        assert!(m.az_averaging);
        assert_eq!(m.aof, Some(60.0));
        assert_eq!(m.target_center, Some(DVec3::new(1.0, 2.0, 0.5)));
        assert_eq!(m.direct_hit_ids.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert!(m.invulnerable_ids.contains(&6));
        assert_eq!(m.blast_volumes.len(), 3);
        assert_eq!(m.blast_volumes[&7].shape(), BlastShape::Sphere);
        assert_eq!(m.blast_volumes[&5].shape(), BlastShape::DoubleCylinder);
        assert_eq!(m.blast_volumes[&8].max_radius(), 2.0);
        assert_eq!(m.kill_description.as_deref(), Some("Mobility kill"));
    }

    #[test]
    fn incomplete_run_skips_path_checks() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("c.out");
        fs::write(&p, " TARGET AV FILE: nowhere.av\n TERMINAL VELOCITY: 1.0\n").unwrap();
        assert!(matches!(
            read_manifest(&p, 1 << 20).unwrap(),
            ManifestOutcome::Incomplete
        ));
    }

    #[test]
    fn missing_named_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_case(dir.path(), &FULL.replace("t.srf", "gone.srf"));
        let err = read_manifest(&p, 1 << 20).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MissingFile);
        assert!(err.to_string().contains("surface file"));
    }

    #[test]
    fn blank_filename_falls_back_to_following_lines() {
        let dir = tempfile::tempdir().unwrap();
        let body = FULL.replace(
            " TARGET AV FILE: t.av\n",
            " TARGET AV FILE:\n\n   not_there.av\n   t.av\n",
        );
        assert_ne!(body, FULL);
        let p = write_case(dir.path(), &body);
        let ManifestOutcome::Complete(m) = read_manifest(&p, 1 << 20).unwrap() else {
            panic!("expected complete run");
        };
        assert_eq!(m.av_file, dir.path().join("t.av"));
    }

    #[test]
    fn blank_filename_without_candidate_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let body = FULL.replace(" TARGET AV FILE: t.av\n", " TARGET AV FILE:\n\n   nope.av\n");
        assert_ne!(body, FULL);
        let p = write_case(dir.path(), &body);
        let err = read_manifest(&p, 1 << 20).unwrap_err();
        assert!(matches!(err, LoadError::UnnamedFile { artifact: "AV file", .. }));

        // the next keyword line ends the search and is still read as a keyword
        let body = FULL.replace(" TARGET AV FILE: t.av\n", " TARGET AV FILE:\n");
        assert_ne!(body, FULL);
        let p = write_case(dir.path(), &body);
        let err = read_manifest(&p, 1 << 20).unwrap_err();
        assert!(matches!(err, LoadError::UnnamedFile { artifact: "AV file", .. }));
    }

    #[test]
    fn second_kill_description_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!("{} MATRIX REQUESTED FOR: other\n", FULL);
        let p = write_case(dir.path(), &body);
        assert!(read_manifest(&p, 1 << 20).is_err());
    }
}
