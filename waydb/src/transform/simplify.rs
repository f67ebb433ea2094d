use std::collections::BTreeSet;

use abstutil::{Counter, Timer};
use geom::{simplify_idx, HashablePt2D};

use super::seg_pts;
use crate::{TagPolicy, WayDatabase};

/// Douglas-Peucker each segment with the tolerance the policy picks for its tags. Ends, point
/// features, junctions with other reference ways, and coordinates a segment visits more than
/// once are never removed; simplification runs separately between them.
pub fn simplify_geometry<P: TagPolicy>(db: &mut WayDatabase, policy: &mut P, timer: &mut Timer) {
    let gs = &db.ref_gs;
    let mut protected: BTreeSet<HashablePt2D> = db.point_db.keys().cloned().collect();
    for segs in db.way_db.values() {
        for seg in segs {
            for id in &seg.pts[1..seg.pts.len() - 1] {
                let pt = gs.pt(*id);
                if gs.find_all_connecting_ways(pt).len() > 1 {
                    protected.insert(pt.to_hashable());
                }
            }
        }
    }

    let mut before = 0;
    let mut after = 0;
    for segs in db.way_db.values_mut() {
        for seg in segs {
            let coords = seg_pts(gs, seg);
            let mut visits = Counter::new();
            for pt in &coords {
                visits.inc(pt.to_hashable());
            }
            let epsilon = policy.simplify_epsilon(&seg.tags);

            let mut keep = vec![seg.pts[0]];
            let mut start = 0;
            for idx in 1..coords.len() {
                let key = coords[idx].to_hashable();
                if idx != coords.len() - 1 && !protected.contains(&key) && visits.get(key) == 1 {
                    continue;
                }
                for k in simplify_idx(&coords[start..=idx], epsilon).into_iter().skip(1) {
                    keep.push(seg.pts[start + k]);
                }
                start = idx;
            }
            before += seg.pts.len();
            after += keep.len();
            seg.pts = keep;
        }
    }
    timer.note(format!(
        "Simplified the merged network from {} to {} points",
        before, after
    ));
}
