use std::f64;
use std::fmt;

// Stores in radians
#[derive(Clone, Copy, Debug)]
pub struct Angle(f64);

impl Angle {
    pub fn new_rads(rads: f64) -> Angle {
        Angle(rads)
    }

    pub fn opposite(&self) -> Angle {
        Angle(self.0 + f64::consts::PI)
    }

    pub fn normalized_radians(&self) -> f64 {
        let rads = self.0 % (2.0 * f64::consts::PI);
        if rads < 0.0 {
            rads + (2.0 * f64::consts::PI)
        } else {
            rads
        }
    }

    pub fn normalized_degrees(&self) -> f64 {
        self.normalized_radians().to_degrees()
    }

    /// The absolute difference to another angle, in [0, 180] degrees.
    pub fn diff_degs(&self, other: Angle) -> f64 {
        let diff = (self.normalized_degrees() - other.normalized_degrees()).abs();
        if diff > 180.0 {
            360.0 - diff
        } else {
            diff
        }
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Angle({} degrees)", self.normalized_degrees())
    }
}
