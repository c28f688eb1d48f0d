use crate::error::{Error, Result};
use glam::{DMat3, DVec3};

/// Restricted-triclinic simulation box in the LAMMPS convention.
///
/// The lower corner sits at `low`; edge lengths are `high - low`. The optional
/// tilt factors `xy`, `xz`, `yz` skew the box. `None` means a strictly
/// orthorhombic box, which is kept distinct from explicit zero tilts so that a
/// data file without an `xy xz yz` line reads back the same way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationBox {
    low: [f64; 3],
    high: [f64; 3],
    tilt: Option<[f64; 3]>,
}

/// Box centered on the origin, parameterized by edge lengths and the
/// dimensionless tilt factors used by HOOMD-blue (`xy/Ly`, `xz/Lz`, `yz/Lz`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenteredBox {
    pub lengths: [f64; 3],
    pub tilt: [f64; 3],
}

impl CenteredBox {
    /// `[Lx, Ly, Lz, xy, xz, yz]`, the layout of a GSD `configuration/box`.
    pub fn to_array(&self) -> [f64; 6] {
        let [lx, ly, lz] = self.lengths;
        let [xy, xz, yz] = self.tilt;
        [lx, ly, lz, xy, xz, yz]
    }

    pub fn from_array(values: [f64; 6]) -> Self {
        Self {
            lengths: [values[0], values[1], values[2]],
            tilt: [values[3], values[4], values[5]],
        }
    }
}

impl SimulationBox {
    pub fn new(low: [f64; 3], high: [f64; 3]) -> Result<Self> {
        Self::build(low, high, None)
    }

    pub fn triclinic(low: [f64; 3], high: [f64; 3], tilt: [f64; 3]) -> Result<Self> {
        Self::build(low, high, Some(tilt))
    }

    /// Unpacks `xlo ylo zlo xhi yhi zhi` (6 values) or the same followed by
    /// `xy xz yz` (9 values).
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values.len() {
            6 => Self::new(
                [values[0], values[1], values[2]],
                [values[3], values[4], values[5]],
            ),
            9 => Self::triclinic(
                [values[0], values[1], values[2]],
                [values[3], values[4], values[5]],
                [values[6], values[7], values[8]],
            ),
            n => Err(Error::shape("box", &[9], &[n])),
        }
    }

    fn build(low: [f64; 3], high: [f64; 3], tilt: Option<[f64; 3]>) -> Result<Self> {
        let all_finite = low
            .iter()
            .chain(high.iter())
            .chain(tilt.iter().flatten())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(Error::InvalidBox("bounds and tilt must be finite".into()));
        }
        for axis in 0..3 {
            if high[axis] < low[axis] {
                return Err(Error::InvalidBox(format!(
                    "high ({}) is below low ({}) along axis {}",
                    high[axis], low[axis], axis
                )));
            }
        }
        Ok(Self { low, high, tilt })
    }

    #[inline]
    pub fn low(&self) -> [f64; 3] {
        self.low
    }

    #[inline]
    pub fn high(&self) -> [f64; 3] {
        self.high
    }

    #[inline]
    pub fn tilt(&self) -> Option<[f64; 3]> {
        self.tilt
    }

    #[inline]
    pub fn tilt_or_zero(&self) -> [f64; 3] {
        self.tilt.unwrap_or([0.0; 3])
    }

    #[inline]
    pub fn is_triclinic(&self) -> bool {
        self.tilt.is_some()
    }

    pub fn lengths(&self) -> [f64; 3] {
        [
            self.high[0] - self.low[0],
            self.high[1] - self.low[1],
            self.high[2] - self.low[2],
        ]
    }

    /// Edge vectors as rows: `a = (Lx, 0, 0)`, `b = (xy, Ly, 0)`, `c = (xz, yz, Lz)`.
    pub fn edge_matrix(&self) -> [[f64; 3]; 3] {
        let [lx, ly, lz] = self.lengths();
        let [xy, xz, yz] = self.tilt_or_zero();
        [[lx, 0.0, 0.0], [xy, ly, 0.0], [xz, yz, lz]]
    }

    /// Builds a box from its origin and edge-vector rows.
    ///
    /// The rows must already be in restricted-triclinic (lower-triangular)
    /// form with non-negative diagonal; general triclinic cells are rejected.
    pub fn from_edge_matrix(origin: [f64; 3], edges: [[f64; 3]; 3]) -> Result<Self> {
        let [a, b, c] = edges;
        if a[1] != 0.0 || a[2] != 0.0 || b[2] != 0.0 {
            return Err(Error::InvalidBox(
                "edge matrix is not in restricted-triclinic form".into(),
            ));
        }
        let high = [origin[0] + a[0], origin[1] + b[1], origin[2] + c[2]];
        let tilt = [b[0], c[0], c[1]];
        if tilt.iter().any(|&t| t != 0.0) {
            Self::triclinic(origin, high, tilt)
        } else {
            Self::new(origin, high)
        }
    }

    fn matrix(&self) -> DMat3 {
        let [a, b, c] = self.edge_matrix();
        DMat3::from_cols(DVec3::from(a), DVec3::from(b), DVec3::from(c))
    }

    /// Fractional coordinates of `position`. The box must have non-zero volume.
    pub fn scale(&self, position: [f64; 3]) -> [f64; 3] {
        let shifted = DVec3::from(position) - DVec3::from(self.low);
        (self.matrix().inverse() * shifted).to_array()
    }

    pub fn unscale(&self, scaled: [f64; 3]) -> [f64; 3] {
        (self.matrix() * DVec3::from(scaled) + DVec3::from(self.low)).to_array()
    }

    /// Maps `position` back into the box and returns the periodic image it left.
    pub fn wrap(&self, position: [f64; 3]) -> ([f64; 3], [i64; 3]) {
        let scaled = DVec3::from(self.scale(position));
        let image = scaled.floor();
        let wrapped = self.unscale((scaled - image).to_array());
        (wrapped, image.to_array().map(|v| v as i64))
    }

    pub fn unwrap(&self, position: [f64; 3], image: [i64; 3]) -> [f64; 3] {
        let image = DVec3::from(image.map(|v| v as f64));
        (DVec3::from(position) + self.matrix() * image).to_array()
    }

    /// Converts to the origin-centered convention.
    ///
    /// Returns the centered box and the translation to add to every position
    /// so that it keeps its place relative to the box.
    pub fn to_centered(&self) -> (CenteredBox, [f64; 3]) {
        let [lx, ly, lz] = self.lengths();
        let [xy, xz, yz] = self.tilt_or_zero();
        let corner = centered_corner([lx, ly, lz], [xy, xz, yz]);
        let translation = (corner - DVec3::from(self.low)).to_array();
        let centered = CenteredBox {
            lengths: [lx, ly, lz],
            tilt: [ratio(xy, ly), ratio(xz, lz), ratio(yz, lz)],
        };
        (centered, translation)
    }

    /// Inverse of [`to_centered`](Self::to_centered). Subtract `translation`
    /// from positions to bring them back into this box's frame.
    pub fn from_centered(centered: &CenteredBox, translation: [f64; 3]) -> Result<Self> {
        let [lx, ly, lz] = centered.lengths;
        let tilt = [
            centered.tilt[0] * ly,
            centered.tilt[1] * lz,
            centered.tilt[2] * lz,
        ];
        let low = centered_corner(centered.lengths, tilt) - DVec3::from(translation);
        let high = low + DVec3::new(lx, ly, lz);
        if tilt.iter().any(|&t| t != 0.0) {
            Self::triclinic(low.to_array(), high.to_array(), tilt)
        } else {
            Self::new(low.to_array(), high.to_array())
        }
    }
}

/// Lower corner of a box of the given shape whose center is the origin.
fn centered_corner(lengths: [f64; 3], tilt: [f64; 3]) -> DVec3 {
    let [lx, ly, lz] = lengths;
    let [xy, xz, yz] = tilt;
    -0.5 * DVec3::new(lx + xy + xz, ly + yz, lz)
}

fn ratio(tilt: f64, length: f64) -> f64 {
    if length == 0.0 { 0.0 } else { tilt / length }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps
    }

    fn assert_vec_close(a: [f64; 3], b: [f64; 3]) {
        for k in 0..3 {
            assert!(approx_eq(a[k], b[k], 1e-10), "{a:?} vs {b:?}");
        }
    }

    fn triclinic() -> SimulationBox {
        SimulationBox::triclinic([-5.0, -10.0, 0.0], [1.0, 10.0, 8.0], [1.0, -2.0, 0.5]).unwrap()
    }

    #[test]
    fn orthorhombic_has_no_tilt() {
        let b = SimulationBox::new([-5.0, -10.0, 0.0], [1.0, 10.0, 8.0]).unwrap();
        assert_eq!(b.tilt(), None);
        assert_eq!(b.tilt_or_zero(), [0.0; 3]);
        assert_eq!(b.lengths(), [6.0, 20.0, 8.0]);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = SimulationBox::new([0.0, 0.0, 0.0], [1.0, -1.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::InvalidBox(_)));
    }

    #[test]
    fn from_slice_accepts_six_or_nine() {
        let ortho = SimulationBox::from_slice(&[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ortho.high(), [1.0, 2.0, 3.0]);
        let tri = SimulationBox::from_slice(&[0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 0.1, 0.2, 0.3]).unwrap();
        assert_eq!(tri.tilt(), Some([0.1, 0.2, 0.3]));
        assert!(matches!(
            SimulationBox::from_slice(&[1.0, 2.0]),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn edge_matrix_roundtrip() {
        let b = triclinic();
        let rebuilt = SimulationBox::from_edge_matrix(b.low(), b.edge_matrix()).unwrap();
        assert_eq!(rebuilt, b);
    }

    #[test]
    fn edge_matrix_rejects_general_triclinic() {
        let edges = [[1.0, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(SimulationBox::from_edge_matrix([0.0; 3], edges).is_err());
    }

    #[test]
    fn scale_and_unscale_are_inverse() {
        let b = triclinic();
        let p = [0.3, -4.0, 2.5];
        assert_vec_close(b.unscale(b.scale(p)), p);
        assert_vec_close(b.scale(b.low()), [0.0; 3]);
    }

    #[test]
    fn wrap_then_unwrap_recovers_position() {
        let b = triclinic();
        let p = [12.0, 25.0, -3.0];
        let (wrapped, image) = b.wrap(p);
        let s = b.scale(wrapped);
        assert!(s.iter().all(|&v| (-1e-12..1.0).contains(&v)), "{s:?}");
        assert_vec_close(b.unwrap(wrapped, image), p);
    }

    #[test]
    fn centered_roundtrip_recovers_bounds_and_positions() {
        let b = triclinic();
        let (centered, shift) = b.to_centered();
        let back = SimulationBox::from_centered(&centered, shift).unwrap();
        assert_vec_close(back.low(), b.low());
        assert_vec_close(back.high(), b.high());
        assert_vec_close(back.tilt_or_zero(), b.tilt_or_zero());

        let p = [0.5, 3.0, 7.0];
        let moved = [p[0] + shift[0], p[1] + shift[1], p[2] + shift[2]];
        let restored = [moved[0] - shift[0], moved[1] - shift[1], moved[2] - shift[2]];
        assert_vec_close(restored, p);
    }

    #[test]
    fn centered_box_keeps_relative_geometry() {
        let b = triclinic();
        let (centered, shift) = b.to_centered();
        let origin_box = SimulationBox::from_centered(&centered, [0.0; 3]).unwrap();
        let p = [0.5, 3.0, 7.0];
        let moved = [p[0] + shift[0], p[1] + shift[1], p[2] + shift[2]];
        assert_vec_close(origin_box.scale(moved), b.scale(p));
    }

    #[test]
    fn symmetric_orthorhombic_box_needs_no_translation() {
        let b = SimulationBox::new([-2.0, -3.0, -4.0], [2.0, 3.0, 4.0]).unwrap();
        let (centered, shift) = b.to_centered();
        assert_eq!(centered.to_array(), [4.0, 6.0, 8.0, 0.0, 0.0, 0.0]);
        assert_vec_close(shift, [0.0; 3]);
    }
}
