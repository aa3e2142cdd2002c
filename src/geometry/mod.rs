//! Gridline and point helpers used by the transform pass.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Rotate gridlines 180 degrees about the origin, then shift them.
/// Maps munition-centered matrix coordinates onto the target frame.
pub fn rotate_and_shift(values: &[f64], shift: f64) -> Vec<f64> {
    values.iter().map(|v| -v + shift).collect()
}

/// Midpoint between each adjacent pair; works for ascending or descending input.
pub fn midpoints(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
}

/// Absolute distance between each adjacent pair.
pub fn measure_between(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| (w[1] - w[0]).abs()).collect()
}

/// `(min, max)` of a list, or `None` when empty.
pub fn extent(values: &[f64]) -> Option<(f64, f64)> {
    let mut it = values.iter().copied();
    let first = it.next()?;
    Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// Index of the value closest to `target`. Ties go to the lower index.
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(f64, usize)> = None;
    for (i, v) in values.iter().enumerate() {
        let d = (v - target).abs();
        match best {
            Some((bd, _)) if bd <= d => {}
            _ => best = Some((d, i)),
        }
    }
    best.map(|(_, i)| i)
}

/// Rotate a point about the Y axis by `aof` degrees, then about Z by `attack_az` degrees.
pub fn rotate_pt_around_yz_axes(p: DVec3, aof: f64, attack_az: f64) -> DVec3 {
    let (s_psi, c_psi) = aof.to_radians().sin_cos();
    let (s_phi, c_phi) = attack_az.to_radians().sin_cos();
    let x2 = p.z * s_psi + p.x * c_psi;
    let y2 = p.y;
    let z2 = p.z * c_psi - p.x * s_psi;
    DVec3::new(x2 * c_phi - y2 * s_phi, x2 * s_phi + y2 * c_phi, z2)
}

/// Running axis-aligned bounds. Only x/y minimums are tracked on the low side;
/// the target sits on the ground plane so z only needs a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub max_z: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
            max_z: f64::NEG_INFINITY,
        }
    }
}

impl Bounds {
    pub fn include(&mut self, p: DVec3) {
        self.min_x = self.min_x.min(p.x);
        self.max_x = self.max_x.max(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_y = self.max_y.max(p.y);
        self.max_z = self.max_z.max(p.z);
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// Center of the x/y footprint.
    pub fn center_xy(&self) -> (f64, f64) {
        ((self.min_x + self.max_x) / 2.0, (self.min_y + self.max_y) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoints_ascending_and_descending() {
        let vec = [-113.54, -75.70, -37.85, 0.00, 37.84];
        let expected = [-94.62, -56.775, -18.925, 18.92];
        for (m, e) in midpoints(&vec).iter().zip(expected) {
            assert!((m - e).abs() < 1e-9);
        }
        assert_eq!(midpoints(&[10.0, 0.0, -10.0]), vec![5.0, -5.0]);
    }

    #[test]
    fn rotate_and_shift_gridlines() {
        let raw = [-10.0, -5.0, 0.0, 5.0, 10.0];
        assert_eq!(
            rotate_and_shift(&raw, 3.0 + 2.0),
            vec![15.0, 10.0, 5.0, 0.0, -5.0]
        );
        assert_eq!(measure_between(&[15.0, 10.0, 5.0]), vec![5.0, 5.0]);
    }

    #[test]
    fn nearest_index_prefers_lower_on_tie() {
        assert_eq!(nearest_index(&[0.0, 45.0, 90.0], 60.0), Some(1));
        assert_eq!(nearest_index(&[0.0, 10.0], 5.0), Some(0));
        assert_eq!(nearest_index(&[], 5.0), None);
    }

    #[test]
    fn rotation_about_y_then_z() {
        let p = rotate_pt_around_yz_axes(DVec3::X, 90.0, 0.0);
        assert!((p - DVec3::new(0.0, 0.0, -1.0)).length() < 1e-12);
        let p = rotate_pt_around_yz_axes(DVec3::X, 0.0, 90.0);
        assert!((p - DVec3::Y).length() < 1e-12);
    }

    #[test]
    fn bounds_track_extremes() {
        let mut b = Bounds::default();
        assert!(b.is_empty());
        b.include(DVec3::new(-2.0, 5.0, 5.0));
        b.include(DVec3::new(2.0, -5.0, 0.0));
        assert_eq!(b.center_xy(), (0.0, 0.0));
        assert_eq!(b.max_z, 5.0);
        assert_eq!(extent(&[3.0, -1.0, 2.0]), Some((-1.0, 3.0)));
    }
}
