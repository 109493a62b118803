//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

pub type Vec2 = uv::DVec2;
pub type Vec3 = uv::DVec3;
pub type Rotor2 = uv::DRotor2;
pub type Mat2 = uv::DMat2;
pub type Mat3 = uv::DMat3;
/// A rigid transform: rotation followed by translation.
pub type Pose = uv::DIsometry2;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    fn from(a: Angle) -> Rotor2 {
        Rotor2::from_angle(a.rad())
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    pub fn new_normalize(v: Vec2) -> Self {
        Unit(v.normalized())
    }

    pub fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }
}

impl std::ops::Mul<Unit<Vec2>> for Rotor2 {
    type Output = Unit<Vec2>;

    fn mul(self, rhs: Unit<Vec2>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

// Vec2 utils

/// Rotate a vector 90 degrees counterclockwise.
#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Rotate a vector 90 degrees clockwise.
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// The z component of the 3D cross product of two vectors lifted to the xy plane.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar angular velocity with a vector, `ω × r`.
#[inline]
pub fn cross_sv(s: f64, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

// small dense solves for constraint effective-mass matrices

/// Invert a 2x2 matrix, or None if its determinant vanishes.
pub fn invert2(m: Mat2) -> Option<Mat2> {
    let det = m.cols[0].x * m.cols[1].y - m.cols[1].x * m.cols[0].y;
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some(Mat2::new(
        Vec2::new(m.cols[1].y * inv_det, -m.cols[0].y * inv_det),
        Vec2::new(-m.cols[1].x * inv_det, m.cols[0].x * inv_det),
    ))
}

/// Invert a 3x3 matrix via the adjugate, or None if its determinant vanishes.
pub fn invert3(m: Mat3) -> Option<Mat3> {
    let c = &m.cols;
    let cofactor = |r1: usize, c1: usize, r2: usize, c2: usize| {
        col(c, c1, r1) * col(c, c2, r2) - col(c, c2, r1) * col(c, c1, r2)
    };
    let det = col(c, 0, 0) * cofactor(1, 1, 2, 2) - col(c, 1, 0) * cofactor(1, 0, 2, 2)
        + col(c, 2, 0) * cofactor(1, 0, 2, 1);
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    // adjugate: transposed cofactor matrix
    Some(Mat3::new(
        Vec3::new(
            cofactor(1, 1, 2, 2) * inv_det,
            -cofactor(1, 0, 2, 2) * inv_det,
            cofactor(1, 0, 2, 1) * inv_det,
        ),
        Vec3::new(
            -cofactor(0, 1, 2, 2) * inv_det,
            cofactor(0, 0, 2, 2) * inv_det,
            -cofactor(0, 0, 2, 1) * inv_det,
        ),
        Vec3::new(
            cofactor(0, 1, 1, 2) * inv_det,
            -cofactor(0, 0, 1, 2) * inv_det,
            cofactor(0, 0, 1, 1) * inv_det,
        ),
    ))
}

#[inline]
fn col(cols: &[Vec3; 3], c: usize, r: usize) -> f64 {
    match r {
        0 => cols[c].x,
        1 => cols[c].y,
        _ => cols[c].z,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert2_roundtrip() {
        let m = Mat2::new(Vec2::new(2.0, 1.0), Vec2::new(-1.0, 3.0));
        let inv = invert2(m).unwrap();
        let id = m * inv;
        assert!((id.cols[0].x - 1.0).abs() < 1e-12);
        assert!(id.cols[0].y.abs() < 1e-12);
        assert!(id.cols[1].x.abs() < 1e-12);
        assert!((id.cols[1].y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn invert2_singular() {
        let m = Mat2::new(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert!(invert2(m).is_none());
    }

    #[test]
    fn invert3_roundtrip() {
        let m = Mat3::new(
            Vec3::new(3.0, 0.0, 2.0),
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        let inv = invert3(m).unwrap();
        let id = m * inv;
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((col(&id.cols, i, j) - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn cross_matches_perp_dot() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(-3.0, 0.5);
        assert!((cross(a, b) - left_normal(a).dot(b)).abs() < 1e-12);
    }
}
