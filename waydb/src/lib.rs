//! Reconciles many independently digitized road-attribute layers onto one reference centerline
//! network. Every layer feature is keyed by an RLID, a linear-referencing identifier; features
//! get snapped onto the reference way for their RLID, then split and merged into a per-RLID list
//! of segments, each carrying one consistent set of tags.
//!
//! Nothing here interprets tag values or does any I/O. Tag conflicts are resolved by a
//! `TagPolicy` supplied by the caller.

#[macro_use]
extern crate log;

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use abstutil::{Tags, Timer};
use geom::{HashablePt2D, Pt2D};

pub use crate::adapt::Adaptation;
pub use crate::config::Config;
pub use crate::geometry_search::{GeometrySearch, Snap};
pub use crate::points::{PointArena, PointId};
pub use crate::policy::TagPolicy;
pub use crate::two_dim_search::TwoDimSearch;
pub use crate::way::{Extent, PointFeature, RefWayId, Rlid, Segment, SegmentId, Way};

mod adapt;
mod config;
mod geometry_search;
mod merge;
mod points;
mod policy;
mod reference;
pub mod transform;
mod two_dim_search;
mod validate;
mod way;

/// The reference network and the working network built on top of it.
pub struct WayDatabase {
    cfg: Config,
    /// Per RLID, segments ordered by distance along the reference. Together they cover the
    /// reference exactly once; stretches no layer mentions are untagged.
    pub way_db: BTreeMap<Rlid, Vec<Segment>>,
    /// Point features, keyed by where they ended up.
    pub point_db: BTreeMap<HashablePt2D, Vec<PointFeature>>,

    ref_gs: GeometrySearch<RefWayId>,
    ref_way_db: BTreeMap<Rlid, Vec<RefWayId>>,
    next_ref_id: usize,

    merged: Option<MergedNetwork>,
    stats: LayerStats,
}

/// A search structure over the merged segments, for topology queries once all line layers are
/// in. Stale after any later change to `way_db`.
pub struct MergedNetwork {
    pub gs: GeometrySearch<SegmentId>,
    segments: Vec<(Rlid, usize)>,
}

/// What happened to the features of one layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStats {
    pub inserted: usize,
    /// Point features snapped onto the network
    pub snapped: usize,
    /// Reference ways that had to be extended to fit a feature
    pub extended: usize,
    /// Features that only fit with the emergency tolerance
    pub emergency: usize,
    pub dropped: usize,
    /// Point features kept where they are, with no geometry in snapping range
    pub unsnapped: usize,
    /// Features with an RLID missing from the reference
    pub skipped: usize,
}

impl WayDatabase {
    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn pt(&self, id: PointId) -> Pt2D {
        self.ref_gs.pt(id)
    }

    pub fn dist(&self, id: PointId) -> Result<f64> {
        self.ref_gs.dist(id)
    }

    pub fn segment_pts(&self, seg: &Segment) -> Vec<Pt2D> {
        seg.pts.iter().map(|id| self.ref_gs.pt(*id)).collect()
    }

    pub fn ref_gs(&self) -> &GeometrySearch<RefWayId> {
        &self.ref_gs
    }

    pub fn reference_ways(&self, rlid: &Rlid) -> &[RefWayId] {
        self.ref_way_db
            .get(rlid)
            .map(|ways| ways.as_slice())
            .unwrap_or(&[])
    }

    /// The reference network as plain features, for debugging.
    pub fn get_reference_geometry(&self) -> Vec<Way> {
        let mut result = Vec::new();
        for (rlid, keys) in &self.ref_way_db {
            for key in keys {
                result.push(Way::new(
                    rlid.clone(),
                    self.ref_gs.way_coords(*key),
                    Tags::empty(),
                ));
            }
        }
        result
    }

    /// Every segment endpoint, and the segments that start or end there.
    pub fn get_endpoint_map(&self) -> BTreeMap<HashablePt2D, Vec<&Segment>> {
        let mut endpoints: BTreeMap<HashablePt2D, Vec<&Segment>> = BTreeMap::new();
        for segs in self.way_db.values() {
            for seg in segs {
                for id in [seg.first(), seg.last()] {
                    endpoints
                        .entry(self.pt(id).to_hashable())
                        .or_insert_with(Vec::new)
                        .push(seg);
                }
            }
        }
        endpoints
    }

    /// Index the merged segments, after all line layers are in.
    pub fn setup_geometry_search(&mut self, timer: &mut Timer) -> Result<()> {
        timer.start("set up search over merged geometry");
        let mut gs = GeometrySearch::new(self.cfg.max_segment_length, false, false);
        let mut segments = Vec::new();
        for (rlid, segs) in &self.way_db {
            for (idx, seg) in segs.iter().enumerate() {
                let id = SegmentId(segments.len());
                gs.insert(id, rlid.clone(), &self.segment_pts(seg))?;
                segments.push((rlid.clone(), idx));
            }
        }
        self.merged = Some(MergedNetwork { gs, segments });
        timer.stop("set up search over merged geometry");
        Ok(())
    }

    pub fn gs(&self) -> Option<&GeometrySearch<SegmentId>> {
        self.merged.as_ref().map(|m| &m.gs)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        let (rlid, idx) = self.merged.as_ref()?.segments.get(id.0)?;
        self.way_db.get(rlid)?.get(*idx)
    }

    /// Insert every line feature of one layer.
    pub fn insert_line_layer<P: TagPolicy>(
        &mut self,
        ways: &[Way],
        source: &str,
        policy: &mut P,
        timer: &mut Timer,
    ) -> Result<LayerStats> {
        self.stats = LayerStats::default();
        timer.start_iter(format!("insert lines from {}", source), ways.len());
        for way in ways {
            timer.next();
            self.insert_rlid_way(way, source, policy, timer)?;
        }
        if self.cfg.perform_self_testing {
            self.test_segments()?;
        }
        info!("{}: {:?}", source, self.stats);
        Ok(self.stats)
    }

    /// Insert every point feature of one layer. Without `do_snap`, points stay where they are.
    pub fn insert_point_layer<P: TagPolicy>(
        &mut self,
        points: &[PointFeature],
        source: &str,
        do_snap: bool,
        policy: &mut P,
        timer: &mut Timer,
    ) -> Result<LayerStats> {
        self.stats = LayerStats::default();
        timer.start_iter(format!("insert points from {}", source), points.len());
        for pt in points {
            timer.next();
            self.insert_rlid_node(pt, source, do_snap, policy, timer)?;
        }
        info!("{}: {:?}", source, self.stats);
        Ok(self.stats)
    }
}
