use std::collections::VecDeque;

use abstutil::Timer;
use geom::{pts_length, Pt2D};
use itertools::Itertools;

use super::{put_segments, seg_pts, take_segments, Junctions};
use crate::{TagPolicy, WayDatabase};

/// Where exactly two segment ends meet and nothing passes through, make the chain run head to
/// tail. Segments the policy won't reverse are settled first, then chains are grown from
/// dead ends, longest first, so longer branches keep their direction.
pub fn make_way_directions_tree_like<P: TagPolicy>(
    db: &mut WayDatabase,
    policy: &mut P,
    timer: &mut Timer,
) {
    let mut segs = take_segments(db);
    let gs = &db.ref_gs;
    let mut coords: Vec<_> = segs.iter().map(|seg| seg_pts(gs, seg)).collect();
    let lengths: Vec<f64> = coords.iter().map(|pts| pts_length(pts).0).collect();

    let mut junctions = Junctions::new();
    for (idx, pts) in coords.iter().enumerate() {
        junctions.add(idx, pts);
    }

    let is_dead_end = |pts: &[Pt2D]| {
        [pts[0], pts[pts.len() - 1]].iter().any(|pt| {
            let key = pt.to_hashable();
            !junctions.is_midpoint(key) && junctions.ends_at(key).len() == 1
        })
    };
    let by_length = |a: &usize, b: &usize| lengths[*b].total_cmp(&lengths[*a]);
    let pinned = (0..segs.len()).filter(|idx| !policy.may_reverse(&segs[*idx].tags));
    let dead_ends = (0..segs.len())
        .filter(|idx| is_dead_end(&coords[*idx]))
        .sorted_by(by_length);
    let rest = (0..segs.len()).sorted_by(by_length);
    let seeds: Vec<usize> = pinned.chain(dead_ends).chain(rest).collect();

    let mut settled = vec![false; segs.len()];
    let mut reversed = 0;
    for seed in seeds {
        if settled[seed] {
            continue;
        }
        settled[seed] = true;
        let mut queue = VecDeque::from(vec![seed]);
        while let Some(current) = queue.pop_front() {
            let n = coords[current].len();
            for (pt, current_starts_here) in [
                (coords[current][0], true),
                (coords[current][n - 1], false),
            ] {
                let key = pt.to_hashable();
                if junctions.is_midpoint(key) {
                    continue;
                }
                let ends = junctions.ends_at(key);
                if ends.len() != 2 {
                    continue;
                }
                let (other, other_starts_here) = match ends.iter().find(|(i, _)| *i != current) {
                    Some(end) => *end,
                    None => continue,
                };
                if settled[other] {
                    continue;
                }
                // Head to tail means exactly one of them starts here
                if other_starts_here == current_starts_here
                    && policy.may_reverse(&segs[other].tags)
                {
                    junctions.remove(other, &coords[other]);
                    segs[other].pts.reverse();
                    policy.reverse_tags(&mut segs[other].tags);
                    coords[other].reverse();
                    junctions.add(other, &coords[other]);
                    reversed += 1;
                }
                settled[other] = true;
                queue.push_back(other);
            }
        }
    }

    put_segments(db, segs);
    if reversed > 0 {
        timer.note(format!("Reversed {} segments to make chains consistent", reversed));
    }
}

#[cfg(test)]
mod tests {
    use abstutil::{Tags, Timer};
    use geom::Pt2D;

    use crate::{Config, Rlid, TagPolicy, Way, WayDatabase};

    fn pts(raw: Vec<(f64, f64)>) -> Vec<Pt2D> {
        raw.into_iter().map(|(x, y)| Pt2D::new(x, y)).collect()
    }

    struct Pinned;
    impl TagPolicy for Pinned {
        fn merge(&mut self, existing: &mut Tags, incoming: &Tags, _: &str) {
            for (k, v) in incoming.inner() {
                existing.insert(k.clone(), v.clone());
            }
        }
        fn may_reverse(&self, tags: &Tags) -> bool {
            !tags.contains_key("oneway")
        }
    }

    fn network(ways: Vec<(&str, Vec<(f64, f64)>, Tags)>) -> WayDatabase {
        let reference = ways
            .iter()
            .map(|(rlid, raw, _)| Way::new(*rlid, pts(raw.clone()), Tags::empty()))
            .collect();
        let mut db =
            WayDatabase::new(Config::default(), reference, &mut Timer::throwaway()).unwrap();
        for (rlid, raw, tags) in ways {
            db.insert_rlid_way(
                &Way::new(rlid, pts(raw), tags),
                "layer",
                &mut Pinned,
                &mut Timer::throwaway(),
            )
            .unwrap();
        }
        db
    }

    fn first_pt(db: &WayDatabase, rlid: &str) -> Pt2D {
        db.pt(db.way_db[&Rlid::from(rlid)][0].first())
    }

    #[test]
    fn chain_runs_head_to_tail() {
        let mut db = network(vec![
            ("A", vec![(0.0, 0.0), (30.0, 0.0)], Tags::empty()),
            ("B", vec![(40.0, 0.0), (30.0, 0.0)], Tags::empty()),
            ("C", vec![(40.0, 0.0), (50.0, 0.0)], Tags::empty()),
        ]);
        db.make_way_directions_tree_like(&mut Pinned, &mut Timer::throwaway());
        // The longest dead end keeps its direction
        assert_eq!(first_pt(&db, "A"), Pt2D::new(0.0, 0.0));
        assert_eq!(first_pt(&db, "B"), Pt2D::new(30.0, 0.0));
        assert_eq!(first_pt(&db, "C"), Pt2D::new(40.0, 0.0));
    }

    #[test]
    fn pinned_segments_win() {
        let oneway: Tags = vec![("oneway", "yes")].into_iter().collect();
        let mut db = network(vec![
            ("A", vec![(0.0, 0.0), (30.0, 0.0)], Tags::empty()),
            ("B", vec![(40.0, 0.0), (30.0, 0.0)], oneway),
        ]);
        db.make_way_directions_tree_like(&mut Pinned, &mut Timer::throwaway());
        assert_eq!(first_pt(&db, "B"), Pt2D::new(40.0, 0.0));
        assert_eq!(first_pt(&db, "A"), Pt2D::new(30.0, 0.0));
    }
}
