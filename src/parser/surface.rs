//! Target surface quadrilaterals (`.srf`).

use super::{split_fields, LineReader};
use crate::error::LoadError;
use crate::geometry::Bounds;
use glam::DVec3;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct SurfaceData {
    /// Four points per facet, in file order.
    pub points: Vec<DVec3>,
    /// One name per facet (possibly empty).
    pub names: Vec<String>,
    pub bounds: Bounds,
}

impl SurfaceData {
    pub fn num_surfaces(&self) -> usize {
        self.names.len()
    }

    pub fn quad(&self, index: usize) -> Option<&[DVec3]> {
        self.points.get(index * 4..index * 4 + 4)
    }

    /// Name for a 1-based surface index, as written in detail files.
    pub fn name_for_hit(&self, hit: u32) -> Option<&str> {
        let idx = (hit as usize).checked_sub(1)?;
        self.names.get(idx).map(String::as_str)
    }
}

pub fn read_surfaces(path: &Path, max_bytes: u64) -> Result<SurfaceData, LoadError> {
    let mut reader = LineReader::open(path, max_bytes)?;
    let data = parse_surfaces(&mut reader)?;
    tracing::info!(
        "read {} surface(s) from {}",
        data.num_surfaces(),
        path.display()
    );
    Ok(data)
}

pub(crate) fn parse_surfaces<R: BufRead>(
    reader: &mut LineReader<R>,
) -> Result<SurfaceData, LoadError> {
    reader.skip_lines(1, "surface file title")?;
    let line = reader.expect_line("surface count")?;
    let count: usize = reader.parse(line.split_whitespace().next(), "surface count")?;
    let num_points = reader.declared_count(&[count, 4], "surface point")?;

    let mut data = SurfaceData {
        points: Vec::with_capacity(num_points),
        names: Vec::with_capacity(count),
        bounds: Bounds::default(),
    };
    for i in 0..count {
        let line = reader.expect_line("surface")?;
        let f = split_fields(&line, 13);
        if f.len() < 12 {
            return Err(reader.error(format!(
                "surface {} needs 12 coordinates, found {} fields",
                i + 1,
                f.len()
            )));
        }
        for corner in f[..12].chunks(3) {
            let p = DVec3::new(
                reader.parse(Some(corner[0]), "surface x")?,
                reader.parse(Some(corner[1]), "surface y")?,
                reader.parse(Some(corner[2]), "surface z")?,
            );
            data.bounds.include(p);
            data.points.push(p);
        }
        data.names.push(f.get(12).copied().unwrap_or("").to_string());
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_quads_and_bounds() {
        let text = "\
SURFACES
2 1
-2 5 5 -2 0 5 -2 0 0 -2 5 0 Left side
2 -5 -5 2 0 -5 2 0 0 2 -5 0
";
        let mut r = LineReader::from_text("t.srf", text);
        let s = parse_surfaces(&mut r).unwrap();
        assert_eq!(s.num_surfaces(), 2);
        assert_eq!(s.points.len(), 8);
        assert_eq!(s.quad(1).unwrap()[0], DVec3::new(2.0, -5.0, -5.0));
        assert_eq!(s.bounds.min_x, -2.0);
        assert_eq!(s.bounds.max_y, 5.0);
        assert_eq!(s.bounds.max_z, 5.0);
        assert_eq!(s.name_for_hit(1), Some("Left side"));
        assert_eq!(s.name_for_hit(2), Some(""));
        assert_eq!(s.name_for_hit(0), None);
    }

    #[test]
    fn short_surface_line_fails() {
        let mut r = LineReader::from_text("t.srf", "S\n1 1\n1 2 3 4 5 6\n");
        let err = parse_surfaces(&mut r).unwrap_err();
        assert!(err.to_string().contains("t.srf:3"));
    }

    #[test]
    fn oversized_surface_count_is_format_error() {
        for text in ["S\n4611686018427387904 1\n", "S\n1000000 1\n"] {
            let mut r = LineReader::from_text("t.srf", text);
            let err = parse_surfaces(&mut r).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::FormatViolation);
            assert!(err.to_string().contains("t.srf:2"));
        }
    }
}
