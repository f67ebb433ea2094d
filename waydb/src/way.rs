use std::fmt;

use serde::{Deserialize, Serialize};

use abstutil::Tags;
use geom::Pt2D;

use crate::PointId;

/// The linear-referencing identifier of the source road network.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rlid(pub String);

impl fmt::Display for Rlid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Rlid {
    fn from(x: &str) -> Rlid {
        Rlid(x.to_string())
    }
}

impl From<String> for Rlid {
    fn from(x: String) -> Rlid {
        Rlid(x)
    }
}

/// Where a feature starts and ends along its RLID, as a measure supplied by the source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub start: f64,
    pub end: f64,
}

/// A line feature as it arrives from a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub rlid: Rlid,
    pub pts: Vec<Pt2D>,
    pub tags: Tags,
    pub extent: Option<Extent>,
}

impl Way {
    pub fn new<R: Into<Rlid>>(rlid: R, pts: Vec<Pt2D>, tags: Tags) -> Way {
        Way {
            rlid: rlid.into(),
            pts,
            tags,
            extent: None,
        }
    }

    pub fn with_extent(mut self, start: f64, end: f64) -> Way {
        self.extent = Some(Extent { start, end });
        self
    }
}

/// A point feature as it arrives from a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointFeature {
    pub rlid: Rlid,
    pub pt: Pt2D,
    pub tags: Tags,
}

impl PointFeature {
    pub fn new<R: Into<Rlid>>(rlid: R, pt: Pt2D, tags: Tags) -> PointFeature {
        PointFeature {
            rlid: rlid.into(),
            pt,
            tags,
        }
    }
}

/// One piece of reference geometry inside the reference `GeometrySearch`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefWayId(pub usize);

impl fmt::Display for RefWayId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RefWay #{}", self.0)
    }
}

/// A segment of the merged network, once `WayDatabase::setup_geometry_search` has indexed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub usize);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Segment #{}", self.0)
    }
}

/// A tag-bearing stretch of the working network. Until the final maintenance passes, `pts` is a
/// contiguous run of the reference way's points.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub rlid: Rlid,
    pub pts: Vec<PointId>,
    pub tags: Tags,
}

impl Segment {
    pub fn new(rlid: Rlid, pts: Vec<PointId>, tags: Tags) -> Segment {
        Segment { rlid, pts, tags }
    }

    /// Same RLID and tags, different points.
    pub fn with_pts(&self, pts: Vec<PointId>) -> Segment {
        Segment {
            rlid: self.rlid.clone(),
            pts,
            tags: self.tags.clone(),
        }
    }

    pub fn first(&self) -> PointId {
        self.pts[0]
    }

    pub fn last(&self) -> PointId {
        self.pts[self.pts.len() - 1]
    }
}
