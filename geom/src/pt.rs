use std::fmt;

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::Angle;

/// A position in a planar, meter-based coordinate system.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pt2D {
    x: f64,
    y: f64,
}

impl Pt2D {
    pub fn new(x: f64, y: f64) -> Pt2D {
        if !x.is_finite() || !y.is_finite() {
            panic!("Bad Pt2D {}, {}", x, y);
        }

        Pt2D { x, y }
    }

    pub fn x(self) -> f64 {
        self.x
    }

    pub fn y(self) -> f64 {
        self.y
    }

    pub fn dist_to(self, to: Pt2D) -> f64 {
        self.dist_sq_to(to).sqrt()
    }

    /// Avoids the square root; fine for comparisons.
    pub fn dist_sq_to(self, to: Pt2D) -> f64 {
        let dx = to.x - self.x;
        let dy = to.y - self.y;
        dx * dx + dy * dy
    }

    pub fn angle_to(self, to: Pt2D) -> Angle {
        Angle::new_rads((to.y() - self.y()).atan2(to.x() - self.x()))
    }

    pub fn offset(self, dx: f64, dy: f64) -> Pt2D {
        Pt2D::new(self.x() + dx, self.y() + dy)
    }

    pub fn approx_eq(self, other: Pt2D, threshold: f64) -> bool {
        self.dist_to(other) <= threshold
    }

    pub fn to_hashable(self) -> HashablePt2D {
        HashablePt2D {
            x_nan: NotNan::new(self.x).unwrap(),
            y_nan: NotNan::new(self.y).unwrap(),
        }
    }

    pub fn to_coord(self) -> geo::Coordinate<f64> {
        geo::Coordinate {
            x: self.x,
            y: self.y,
        }
    }
}

impl fmt::Display for Pt2D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pt2D({0}, {1})", self.x(), self.y())
    }
}

impl From<geo::Coordinate<f64>> for Pt2D {
    fn from(c: geo::Coordinate<f64>) -> Self {
        Pt2D::new(c.x, c.y)
    }
}

/// Exact-coordinate key. Two points are the same junction only if their coordinates are
/// bit-for-bit equal, so this is what every map and index uses.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashablePt2D {
    x_nan: NotNan<f64>,
    y_nan: NotNan<f64>,
}

impl HashablePt2D {
    pub fn x(&self) -> f64 {
        self.x_nan.into_inner()
    }

    pub fn y(&self) -> f64 {
        self.y_nan.into_inner()
    }

    pub fn to_pt2d(self) -> Pt2D {
        Pt2D::new(self.x(), self.y())
    }
}

impl From<Pt2D> for HashablePt2D {
    fn from(pt: Pt2D) -> Self {
        pt.to_hashable()
    }
}

impl fmt::Display for HashablePt2D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({0}, {1})", self.x(), self.y())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distances() {
        let a = Pt2D::new(0.0, 0.0);
        let b = Pt2D::new(3.0, 4.0);
        assert_eq!(a.dist_to(b), 5.0);
        assert_eq!(a.dist_sq_to(b), 25.0);
        assert!(a.approx_eq(Pt2D::new(0.05, 0.0), 0.1));
    }

    #[test]
    fn hashable_round_trips_exactly() {
        let pt = Pt2D::new(1.25, -7.5);
        assert_eq!(pt.to_hashable().to_pt2d(), pt);
        assert!(Pt2D::new(0.0, 0.0).to_hashable() < Pt2D::new(0.0, 1.0).to_hashable());
    }

    #[test]
    #[should_panic]
    fn rejects_nan() {
        Pt2D::new(f64::NAN, 0.0);
    }
}
