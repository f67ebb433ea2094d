use anyhow::Result;

use abstutil::Timer;
use geom::pts_length;

use super::join;
use crate::{TagPolicy, WayDatabase};

pub fn remove_short_sub_segments<P: TagPolicy>(
    db: &mut WayDatabase,
    policy: &mut P,
    timer: &mut Timer,
) -> Result<()> {
    let short_len = db.cfg.short_segment_length;
    let stub_len = db.cfg.short_stub_length;
    let gs = &db.ref_gs;
    let length = |pts: &[crate::PointId]| -> f64 {
        pts_length(&pts.iter().map(|id| gs.pt(*id)).collect::<Vec<_>>()).0
    };

    let mut count = 0;
    for (rlid, segs) in db.way_db.iter_mut() {
        let n = segs.len();
        let mut removed = vec![false; n];
        for idx in 0..n {
            let seg_len = length(&segs[idx].pts);
            if seg_len > short_len {
                continue;
            }

            let prev = (0..idx).rev().find(|i| !removed[*i]);
            let prev_len = match prev {
                Some(p) if gs.pt(segs[p].last()) == gs.pt(segs[idx].first()) => {
                    length(&segs[p].pts)
                }
                _ => 0.0,
            };
            let next = (idx + 1) % n;
            let next_connected = next != idx
                && !removed[next]
                && gs.pt(segs[next].first()) == gs.pt(segs[idx].last());
            let next_len = if next_connected {
                length(&segs[next].pts)
            } else {
                0.0
            };

            if prev_len == 0.0 && next_len == 0.0 {
                debug!(
                    "RLID {} has a short unconnected segment ({}m) at {}",
                    rlid,
                    seg_len,
                    gs.pt(segs[idx].first())
                );
                continue;
            }
            // Longer stubs survive inside a chain, or if they have some shape, or if the policy
            // wants them.
            if seg_len > stub_len
                && ((prev_len != 0.0 && next_len != 0.0)
                    || segs[idx].pts.len() > 2
                    || policy.keep_end_stub(&segs[idx]))
            {
                continue;
            }

            if prev_len > next_len {
                if let Some(p) = prev {
                    let tail = segs[idx].pts[1..].to_vec();
                    segs[p].pts.extend(tail);
                }
            } else {
                let mut pts = segs[idx].pts[..segs[idx].pts.len() - 1].to_vec();
                pts.extend(&segs[next].pts);
                segs[next].pts = pts;
            }
            removed[idx] = true;
            count += 1;
        }

        let mut idx = 0;
        segs.retain(|_| {
            idx += 1;
            !removed[idx - 1]
        });
    }
    if count > 0 {
        timer.note(format!("Absorbed {} short segments into their neighbors", count));
    }

    join::join_within_rlid(db)?;
    Ok(())
}
