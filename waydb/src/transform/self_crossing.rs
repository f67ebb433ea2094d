use abstutil::Timer;
use geom::{is_self_crossing, split_self_crossing};

use super::seg_pts;
use crate::WayDatabase;

pub fn split_self_crossing_segments(db: &mut WayDatabase, timer: &mut Timer) {
    let gs = &db.ref_gs;
    let mut count = 0;
    for segs in db.way_db.values_mut() {
        let mut result = Vec::new();
        for seg in segs.drain(..) {
            let coords = seg_pts(gs, &seg);
            if !is_self_crossing(&coords) {
                result.push(seg);
                continue;
            }
            let pieces = split_self_crossing(&coords);
            debug!(
                "RLID {} crosses itself; splitting it into {} pieces",
                seg.rlid,
                pieces.len()
            );
            let mut offset = 0;
            for piece in pieces {
                result.push(seg.with_pts(seg.pts[offset..offset + piece.len()].to_vec()));
                offset += piece.len() - 1;
            }
            count += 1;
        }
        *segs = result;
    }
    if count > 0 {
        timer.note(format!("Split {} self-crossing segments", count));
    }
}
