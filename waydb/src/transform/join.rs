use std::collections::{BTreeSet, VecDeque};

use anyhow::{bail, Result};

use abstutil::Timer;
use geom::Line;

use super::{put_segments, seg_pts, take_segments, Junctions};
use crate::{Segment, TagPolicy, WayDatabase};

pub fn join_segments_with_same_tags<P: TagPolicy>(
    db: &mut WayDatabase,
    join_rlid: bool,
    policy: &mut P,
    timer: &mut Timer,
) -> Result<()> {
    let mut count = join_within_rlid(db)?;
    if join_rlid {
        count += join_across_rlids(db, policy);
    }
    if count > 0 {
        timer.note(format!("Joined {} segments with the same tags", count));
    }
    Ok(())
}

/// Consecutive segments of one RLID meeting end to start with identical tags become one.
pub fn join_within_rlid(db: &mut WayDatabase) -> Result<usize> {
    let gs = &db.ref_gs;
    let mut count = 0;
    for (rlid, segs) in db.way_db.iter_mut() {
        let mut joined: Vec<Segment> = Vec::new();
        for seg in segs.drain(..) {
            if seg.pts.len() < 2 {
                bail!(
                    "RLID {} has a segment with only {} points",
                    rlid,
                    seg.pts.len()
                );
            }
            if let Some(prev) = joined.last_mut() {
                if gs.pt(prev.last()) == gs.pt(seg.first()) && prev.tags == seg.tags {
                    prev.pts.extend(&seg.pts[1..]);
                    count += 1;
                    continue;
                }
            }
            joined.push(seg);
        }
        *segs = joined;
    }
    Ok(count)
}

// At every junction where only segment ends meet, join the pair with matching tags that bends
// the least. A segment may be reversed to line up if the policy allows it, as long as its tags
// still match afterwards. The joined segment keeps the RLID of the one arriving at the junction.
fn join_across_rlids<P: TagPolicy>(db: &mut WayDatabase, policy: &mut P) -> usize {
    let mut pool: Vec<Option<Segment>> = take_segments(db).into_iter().map(Some).collect();
    let gs = &db.ref_gs;

    let mut junctions = Junctions::new();
    for (idx, seg) in pool.iter().enumerate() {
        if let Some(seg) = seg {
            junctions.add(idx, &seg_pts(gs, seg));
        }
    }
    let mut queue: VecDeque<_> = junctions.ends.raw_map().keys().cloned().collect();
    let mut queued: BTreeSet<_> = queue.iter().cloned().collect();

    let mut count = 0;
    while let Some(key) = queue.pop_front() {
        queued.remove(&key);
        if junctions.is_midpoint(key) {
            continue;
        }
        let ends = junctions.ends_at(key);
        if ends.len() < 2 {
            continue;
        }

        // (deviation, arriving, reverse it, leaving, reverse it)
        let mut best: Option<(f64, usize, bool, usize, bool)> = None;
        for (a, a_starts_here) in &ends {
            for (b, b_starts_here) in &ends {
                if a == b {
                    continue;
                }
                let reverse_a = *a_starts_here;
                let reverse_b = !*b_starts_here;
                // The opposite pairing covers this without reversing anything
                if reverse_a && reverse_b {
                    continue;
                }
                let (seg_a, seg_b) = match (&pool[*a], &pool[*b]) {
                    (Some(seg_a), Some(seg_b)) => (seg_a, seg_b),
                    _ => continue,
                };
                // Closed loops have distinct ids at both ends
                if gs.pt(seg_a.first()) == gs.pt(seg_a.last())
                    || gs.pt(seg_b.first()) == gs.pt(seg_b.last())
                {
                    continue;
                }
                if (reverse_a && !policy.may_reverse(&seg_a.tags))
                    || (reverse_b && !policy.may_reverse(&seg_b.tags))
                {
                    continue;
                }
                let mut tags_a = seg_a.tags.clone();
                let mut pts_a = seg_pts(gs, seg_a);
                if reverse_a {
                    policy.reverse_tags(&mut tags_a);
                    pts_a.reverse();
                }
                let mut tags_b = seg_b.tags.clone();
                let mut pts_b = seg_pts(gs, seg_b);
                if reverse_b {
                    policy.reverse_tags(&mut tags_b);
                    pts_b.reverse();
                }
                if tags_a != tags_b {
                    continue;
                }

                let n = pts_a.len();
                let arriving = Line::new(pts_a[n - 2], pts_a[n - 1]).angle();
                let leaving = Line::new(pts_b[0], pts_b[1]).angle();
                let deviation = arriving.diff_degs(leaving);
                if best.map(|(d, _, _, _, _)| deviation < d).unwrap_or(true) {
                    best = Some((deviation, *a, reverse_a, *b, reverse_b));
                }
            }
        }

        let (_, a, reverse_a, b, reverse_b) = match best {
            Some(best) => best,
            None => continue,
        };
        let (mut seg_a, mut seg_b) = match (pool[a].take(), pool[b].take()) {
            (Some(seg_a), Some(seg_b)) => (seg_a, seg_b),
            _ => continue,
        };
        junctions.remove(a, &seg_pts(gs, &seg_a));
        junctions.remove(b, &seg_pts(gs, &seg_b));
        if reverse_a {
            seg_a.pts.reverse();
            policy.reverse_tags(&mut seg_a.tags);
        }
        if reverse_b {
            seg_b.pts.reverse();
            policy.reverse_tags(&mut seg_b.tags);
        }
        debug!(
            "Joining RLID {} and {} at {}",
            seg_a.rlid,
            seg_b.rlid,
            key
        );
        seg_a.pts.extend(&seg_b.pts[1..]);

        let pts = seg_pts(gs, &seg_a);
        let idx = pool.len();
        junctions.add(idx, &pts);
        pool.push(Some(seg_a));
        for end in [pts[0], pts[pts.len() - 1]] {
            if queued.insert(end.to_hashable()) {
                queue.push_back(end.to_hashable());
            }
        }
        count += 1;
    }

    put_segments(db, pool.into_iter().flatten().collect());
    count
}
