use anyhow::Result;

use abstutil::{MultiMap, Timer};
use geom::{HashablePt2D, Pt2D};

use crate::{GeometrySearch, RefWayId, Segment, TagPolicy, WayDatabase};

mod directions;
mod join;
mod self_crossing;
mod short_segments;
mod simplify;

impl WayDatabase {
    /// Clean up the working network once every layer is in. After this, segments are no longer
    /// contiguous runs of reference points.
    pub fn run_maintenance_passes<P: TagPolicy>(
        &mut self,
        join_rlid: bool,
        policy: &mut P,
        timer: &mut Timer,
    ) -> Result<()> {
        timer.start("clean up merged network");
        self.remove_short_sub_segments(policy, timer)?;
        self.join_segments_with_same_tags(join_rlid, policy, timer)?;
        self.make_way_directions_tree_like(policy, timer);
        self.simplify_geometry(policy, timer);
        self.split_self_crossing_segments(timer);
        timer.stop("clean up merged network");
        Ok(())
    }

    /// Short segments and stubs get absorbed into their longer neighbor within the same RLID.
    pub fn remove_short_sub_segments<P: TagPolicy>(
        &mut self,
        policy: &mut P,
        timer: &mut Timer,
    ) -> Result<()> {
        timer.start("removing short segments");
        short_segments::remove_short_sub_segments(self, policy, timer)?;
        timer.stop("removing short segments");
        Ok(())
    }

    /// Adjacent segments of an RLID with identical tags become one. With `join_rlid`, segments of
    /// different RLIDs meeting end to end get joined too, when their tags match (possibly after
    /// reversing one of them).
    pub fn join_segments_with_same_tags<P: TagPolicy>(
        &mut self,
        join_rlid: bool,
        policy: &mut P,
        timer: &mut Timer,
    ) -> Result<()> {
        timer.start("joining segments with the same tags");
        join::join_segments_with_same_tags(self, join_rlid, policy, timer)?;
        timer.stop("joining segments with the same tags");
        Ok(())
    }

    /// Flip segments so chains through simple junctions run head to tail.
    pub fn make_way_directions_tree_like<P: TagPolicy>(
        &mut self,
        policy: &mut P,
        timer: &mut Timer,
    ) {
        timer.start("orienting segments");
        directions::make_way_directions_tree_like(self, policy, timer);
        timer.stop("orienting segments");
    }

    pub fn simplify_geometry<P: TagPolicy>(&mut self, policy: &mut P, timer: &mut Timer) {
        timer.start("simplifying geometry");
        simplify::simplify_geometry(self, policy, timer);
        timer.stop("simplifying geometry");
    }

    pub fn split_self_crossing_segments(&mut self, timer: &mut Timer) {
        timer.start("splitting self-crossing segments");
        self_crossing::split_self_crossing_segments(self, timer);
        timer.stop("splitting self-crossing segments");
    }
}

// Every segment, in RLID order, leaving way_db empty.
fn take_segments(db: &mut WayDatabase) -> Vec<Segment> {
    std::mem::take(&mut db.way_db)
        .into_values()
        .flatten()
        .collect()
}

// Order within an RLID is kept.
fn put_segments(db: &mut WayDatabase, segs: Vec<Segment>) {
    for seg in segs {
        db.way_db
            .entry(seg.rlid.clone())
            .or_insert_with(Vec::new)
            .push(seg);
    }
}

fn seg_pts(gs: &GeometrySearch<RefWayId>, seg: &Segment) -> Vec<Pt2D> {
    seg.pts.iter().map(|id| gs.pt(*id)).collect()
}

/// Segment ends and interior points by coordinate, over a flat list of segments.
struct Junctions {
    // (segment index, is it the start)
    ends: MultiMap<HashablePt2D, (usize, bool)>,
    midpoints: MultiMap<HashablePt2D, usize>,
}

impl Junctions {
    fn new() -> Junctions {
        Junctions {
            ends: MultiMap::new(),
            midpoints: MultiMap::new(),
        }
    }

    fn add(&mut self, idx: usize, pts: &[Pt2D]) {
        self.ends.insert(pts[0].to_hashable(), (idx, true));
        self.ends.insert(pts[pts.len() - 1].to_hashable(), (idx, false));
        for pt in &pts[1..pts.len() - 1] {
            self.midpoints.insert(pt.to_hashable(), idx);
        }
    }

    fn remove(&mut self, idx: usize, pts: &[Pt2D]) {
        self.ends.remove(pts[0].to_hashable(), (idx, true));
        self.ends.remove(pts[pts.len() - 1].to_hashable(), (idx, false));
        for pt in &pts[1..pts.len() - 1] {
            self.midpoints.remove(pt.to_hashable(), idx);
        }
    }

    fn ends_at(&self, pt: HashablePt2D) -> Vec<(usize, bool)> {
        self.ends.get(pt).iter().cloned().collect()
    }

    fn is_midpoint(&self, pt: HashablePt2D) -> bool {
        !self.midpoints.get(pt).is_empty()
    }
}
