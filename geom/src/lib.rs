//! Planar geometry for road centerlines measured in meters. Points are plain `f64` pairs;
//! `HashablePt2D` is the exact-coordinate key used wherever a coordinate doubles as an identity.

mod angle;
mod line;
mod polyline;
mod pt;

pub use crate::angle::Angle;
pub use crate::line::Line;
pub use crate::polyline::{
    dedupe_adjacent, is_self_crossing, pts_length, simplify_idx, split_self_crossing,
};
pub use crate::pt::{HashablePt2D, Pt2D};

/// Cross-product tolerance used when deciding if a point lies on a segment.
pub const ON_LINE_TOLERANCE: f64 = 1e-5;
