//! PK matrix (`.mtx`): range/deflection gridlines and one kill probability per cell.

use super::{kill::parse_kill_label, value_after_colon, LineReader};
use crate::error::LoadError;
use std::io::BufRead;
use std::path::Path;

const MATRIX_HEADER: &str = "<MATRIX HEADER>";

/// Matrix exactly as read, in munition-centered coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixData {
    pub kill: u32,
    pub cells_range: usize,
    pub cells_defl: usize,
    pub offset_range: f64,
    pub offset_defl: f64,
    /// `cells_range + 1` values.
    pub gridlines_range: Vec<f64>,
    /// `cells_defl + 1` values.
    pub gridlines_defl: Vec<f64>,
    /// Row-major, `cells_range` rows of `cells_defl`.
    pub pks: Vec<f64>,
    /// Cells moved into [0, 1] when the file was read.
    pub clipped: usize,
}

impl MatrixData {
    pub fn pk(&self, range: usize, defl: usize) -> Option<f64> {
        (range < self.cells_range && defl < self.cells_defl)
            .then(|| self.pks[range * self.cells_defl + defl])
    }

    /// Clamp every PK into [0, 1]; returns how many cells moved.
    pub fn clip_pks(&mut self) -> usize {
        let mut changed = 0;
        for pk in &mut self.pks {
            let clipped = pk.clamp(0.0, 1.0);
            if clipped != *pk {
                changed += 1;
                *pk = clipped;
            }
        }
        changed
    }
}

pub fn read_matrix(path: &Path, max_bytes: u64) -> Result<MatrixData, LoadError> {
    let mut reader = LineReader::open(path, max_bytes)?;
    let mut mtx = parse_matrix(&mut reader)?;
    mtx.clipped = mtx.clip_pks();
    if mtx.clipped > 0 {
        tracing::warn!("clipped {} PK value(s) into [0, 1]", mtx.clipped);
    }
    tracing::info!(
        "read {}x{} PK matrix for k{} from {}",
        mtx.cells_range,
        mtx.cells_defl,
        mtx.kill,
        path.display()
    );
    Ok(mtx)
}

fn pair<R: BufRead>(reader: &LineReader<R>, line: &str, what: &str) -> Result<(String, String), LoadError> {
    let mut parts = line.split(',').map(str::trim);
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Ok((a.to_string(), b.to_string())),
        _ => Err(reader.error(format!("expected two comma-separated {}", what))),
    }
}

fn gridlines<R: BufRead>(
    reader: &mut LineReader<R>,
    cells: usize,
    what: &str,
) -> Result<Vec<f64>, LoadError> {
    reader.skip_lines(1, &format!("{} gridlines header", what))?;
    let line = reader.expect_line(&format!("{} gridlines", what))?;
    let values = line
        .split_whitespace()
        .map(|t| reader.parse_finite(Some(t), &format!("{} gridline", what)))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len().checked_sub(1) != Some(cells) {
        return Err(reader.error(format!(
            "{} gridlines: expected {} values for {} cells, found {}",
            what,
            cells.saturating_add(1),
            cells,
            values.len()
        )));
    }
    Ok(values)
}

pub(crate) fn parse_matrix<R: BufRead>(reader: &mut LineReader<R>) -> Result<MatrixData, LoadError> {
    loop {
        match reader.next_line()? {
            Some(line) if line.starts_with(MATRIX_HEADER) => break,
            Some(_) => {}
            None => return Err(reader.error("no <MATRIX HEADER> in matrix file")),
        }
    }

    let line = reader.expect_line("matrix kill id")?;
    let kill = value_after_colon(&line)
        .split_whitespace()
        .next()
        .and_then(parse_kill_label)
        .ok_or_else(|| reader.error("cannot read matrix kill id"))?;
    reader.skip_lines(2, "<MATRIX DETAILS> and <MATRIX DIMENSIONS>")?;

    let line = reader.expect_line("matrix dimensions")?;
    let (r, d) = pair(reader, &line, "cell counts")?;
    let cells_range: usize = reader.parse(Some(&r), "range cell count")?;
    let cells_defl: usize = reader.parse(Some(&d), "deflection cell count")?;
    let num_cells = reader.declared_count(&[cells_range, cells_defl], "PK cell")?;

    reader.skip_lines(1, "matrix offset header")?;
    let line = reader.expect_line("matrix offset")?;
    let (r, d) = pair(reader, &line, "offsets")?;
    let offset_range = reader.parse_finite(Some(&r), "range offset")?;
    let offset_defl = reader.parse_finite(Some(&d), "deflection offset")?;

    let gridlines_range = gridlines(reader, cells_range, "range")?;
    let gridlines_defl = gridlines(reader, cells_defl, "deflection")?;

    reader.skip_lines(1, "matrix pks header")?;
    let mut pks = Vec::with_capacity(num_cells);
    for row in 0..cells_range {
        let line = reader.expect_line(&format!("PK row {}", row + 1))?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < cells_defl {
            return Err(reader.error(format!(
                "PK row {} has {} values, expected {}",
                row + 1,
                tokens.len(),
                cells_defl
            )));
        }
        for t in &tokens[..cells_defl] {
            pks.push(reader.parse_finite(Some(t), "PK")?);
        }
    }

    Ok(MatrixData {
        kill,
        cells_range,
        cells_defl,
        offset_range,
        offset_defl,
        gridlines_range,
        gridlines_defl,
        pks,
        clipped: 0,
    })
}
