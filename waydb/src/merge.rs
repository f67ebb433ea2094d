use anyhow::Result;

use abstutil::Tags;

use crate::{PointId, Rlid, Segment, TagPolicy, WayDatabase};

impl WayDatabase {
    /// Stretches of the RLID's reference ways that no segment covers get an untagged segment, so
    /// the segments always partition the whole reference.
    pub(crate) fn cover_reference(&mut self, rlid: &Rlid) -> Result<()> {
        let mut fillers = Vec::new();
        for key in self.reference_ways(rlid) {
            let ref_ids = self.ref_gs.way_pts(*key);
            if ref_ids.len() < 2 {
                continue;
            }
            // Edge i runs from ref_ids[i] to ref_ids[i + 1]
            let mut covered = vec![false; ref_ids.len() - 1];
            for seg in self.way_db.get(rlid).into_iter().flatten() {
                if let Some(start) = ref_ids.iter().position(|id| *id == seg.first()) {
                    let end = (start + seg.pts.len() - 1).min(covered.len());
                    for edge in &mut covered[start..end] {
                        *edge = true;
                    }
                }
            }

            let mut i = 0;
            while i < covered.len() {
                if covered[i] {
                    i += 1;
                    continue;
                }
                let mut j = i;
                while j < covered.len() && !covered[j] {
                    j += 1;
                }
                fillers.push(Segment::new(
                    rlid.clone(),
                    ref_ids[i..=j].to_vec(),
                    Tags::empty(),
                ));
                i = j;
            }
        }
        if fillers.is_empty() {
            return Ok(());
        }

        let segs = self.way_db.entry(rlid.clone()).or_insert_with(Vec::new);
        segs.extend(fillers);
        let mut by_dist = Vec::new();
        for seg in segs.drain(..) {
            by_dist.push((self.ref_gs.dist(seg.first())?, seg));
        }
        by_dist.sort_by(|a, b| a.0.total_cmp(&b.0));
        segs.extend(by_dist.into_iter().map(|(_, seg)| seg));
        Ok(())
    }

    /// Merge a freshly adapted segment into the segments of its RLID. Where it overlaps existing
    /// segments, both sides get split at each other's boundaries so every overlapping span is one
    /// segment, and the policy folds the new tags in once per span. Stretches the new segment
    /// covers alone are inserted as-is.
    pub(crate) fn split_and_merge<P: TagPolicy>(
        &mut self,
        mut way: Segment,
        source: &str,
        policy: &mut P,
    ) -> Result<()> {
        if way.pts.len() < 2 {
            return Ok(());
        }
        let gs = &self.ref_gs;
        let d = |id: PointId| gs.dist(id);
        let segs = self
            .way_db
            .entry(way.rlid.clone())
            .or_insert_with(Vec::new);

        if segs.is_empty() {
            segs.push(way);
            return Ok(());
        }
        if d(way.last())? <= d(segs[0].first())? {
            segs.insert(0, way);
            return Ok(());
        }
        if d(way.first())? >= d(segs[segs.len() - 1].last())? {
            segs.push(way);
            return Ok(());
        }

        let mut i = 0;
        while i < segs.len() {
            if d(segs[i].last())? <= d(way.first())? {
                i += 1;
                continue;
            }
            if d(segs[i].first())? >= d(way.last())? {
                segs.insert(i, way);
                return Ok(());
            }

            // The way starts in a gap before this segment. That part is new.
            let boundary = d(segs[i].first())?;
            if d(way.first())? < boundary {
                let mut k = 0;
                while d(way.pts[k])? < boundary {
                    k += 1;
                }
                if d(way.pts[k])? > boundary {
                    way.pts.insert(k, segs[i].first());
                }
                let head = way.with_pts(way.pts[..=k].to_vec());
                way.pts.drain(..k);
                segs.insert(i, head);
                i += 1;
                continue;
            }

            // Split off the part of the segment before the way
            let start = d(way.first())?;
            let mut k = 0;
            while k < segs[i].pts.len() {
                let dist = d(segs[i].pts[k])?;
                if dist >= start {
                    if dist > start {
                        segs[i].pts.insert(k, way.first());
                    }
                    break;
                }
                k += 1;
            }
            if k > 0 {
                let head = segs[i].with_pts(segs[i].pts[..=k].to_vec());
                segs[i].pts.drain(..k);
                segs.insert(i, head);
                i += 1;
            }

            // Both now start at the same point. Give them the same points while they overlap.
            let seg = &mut segs[i];
            let (mut sk, mut wk) = (0, 0);
            while sk < seg.pts.len() && wk < way.pts.len() {
                let (ds, dw) = (d(seg.pts[sk])?, d(way.pts[wk])?);
                if ds > dw {
                    seg.pts.insert(sk, way.pts[wk]);
                } else if ds < dw {
                    way.pts.insert(wk, seg.pts[sk]);
                }
                sk += 1;
                wk += 1;
            }

            let mut tail = None;
            if sk < seg.pts.len() {
                tail = Some(seg.with_pts(seg.pts[sk - 1..].to_vec()));
                seg.pts.truncate(sk);
            }
            let mut next_way = None;
            if way.pts.len() > seg.pts.len() {
                next_way = Some(way.with_pts(way.pts[seg.pts.len() - 1..].to_vec()));
                way.pts.truncate(seg.pts.len());
            }
            policy.merge(&mut seg.tags, &way.tags, source);
            if let Some(tail) = tail {
                segs.insert(i + 1, tail);
            }

            match next_way {
                Some(next) => {
                    way = next;
                    if d(way.first())? >= d(segs[segs.len() - 1].last())? {
                        segs.push(way);
                        return Ok(());
                    }
                    i += 1;
                }
                None => return Ok(()),
            }
        }
        segs.push(way);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use abstutil::{Tags, Timer};
    use geom::Pt2D;

    use crate::{Config, Rlid, Way, WayDatabase};

    fn pts(raw: Vec<(f64, f64)>) -> Vec<Pt2D> {
        raw.into_iter().map(|(x, y)| Pt2D::new(x, y)).collect()
    }

    fn tags(kv: Vec<(&str, &str)>) -> Tags {
        kv.into_iter().collect()
    }

    fn union(existing: &mut Tags, incoming: &Tags, _: &str) {
        for (k, v) in incoming.inner() {
            if !existing.contains_key(k) {
                existing.insert(k.clone(), v.clone());
            }
        }
    }

    fn r1() -> WayDatabase {
        let mut cfg = Config::default();
        cfg.perform_self_testing = true;
        WayDatabase::new(
            cfg,
            vec![Way::new(
                "R1",
                pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)]),
                Tags::empty(),
            )],
            &mut Timer::throwaway(),
        )
        .unwrap()
    }

    fn layout(db: &WayDatabase) -> Vec<(Vec<Pt2D>, Tags)> {
        db.way_db[&Rlid::from("R1")]
            .iter()
            .map(|seg| (db.segment_pts(seg), seg.tags.clone()))
            .collect()
    }

    #[test]
    fn overlap_splits_both() {
        let mut db = r1();
        let mut timer = Timer::throwaway();
        let mut policy = union;
        db.insert_rlid_way(
            &Way::new(
                "R1",
                pts(vec![(0.0, 0.0), (20.0, 0.0)]),
                tags(vec![("speed", "50")]),
            ),
            "speed",
            &mut policy,
            &mut timer,
        )
        .unwrap();
        db.insert_rlid_way(
            &Way::new(
                "R1",
                pts(vec![(10.0, 0.0), (30.0, 0.0)]),
                tags(vec![("lanes", "2")]),
            ),
            "lanes",
            &mut policy,
            &mut timer,
        )
        .unwrap();

        assert_eq!(
            layout(&db),
            vec![
                (
                    pts(vec![(0.0, 0.0), (10.0, 0.0)]),
                    tags(vec![("speed", "50")])
                ),
                (
                    pts(vec![(10.0, 0.0), (20.0, 0.0)]),
                    tags(vec![("speed", "50"), ("lanes", "2")])
                ),
                (
                    pts(vec![(20.0, 0.0), (30.0, 0.0)]),
                    tags(vec![("lanes", "2")])
                ),
            ]
        );
        db.test_segments().unwrap();
    }

    #[test]
    fn gaps_are_filled_by_later_layers() {
        let mut db = r1();
        let mut timer = Timer::throwaway();
        let mut policy = union;
        for (from, to, v) in [(0.0, 10.0, "a"), (20.0, 30.0, "b")] {
            db.insert_rlid_way(
                &Way::new("R1", pts(vec![(from, 0.0), (to, 0.0)]), tags(vec![("x", v)])),
                "x",
                &mut policy,
                &mut timer,
            )
            .unwrap();
        }
        db.insert_rlid_way(
            &Way::new(
                "R1",
                pts(vec![(5.0, 0.0), (25.0, 0.0)]),
                tags(vec![("y", "1")]),
            ),
            "y",
            &mut policy,
            &mut timer,
        )
        .unwrap();

        let segs = layout(&db);
        assert_eq!(segs.len(), 5);
        assert_eq!(segs[0].1, tags(vec![("x", "a")]));
        assert_eq!(segs[1].1, tags(vec![("x", "a"), ("y", "1")]));
        assert_eq!(segs[2].0, pts(vec![(10.0, 0.0), (20.0, 0.0)]));
        assert_eq!(segs[2].1, tags(vec![("y", "1")]));
        assert_eq!(segs[3].1, tags(vec![("x", "b"), ("y", "1")]));
        assert_eq!(segs[4].1, tags(vec![("x", "b")]));
        db.test_segments().unwrap();
    }

    #[test]
    fn policy_runs_once_per_span() {
        let mut db = r1();
        let mut timer = Timer::throwaway();
        let mut calls = 0;
        let mut policy = |existing: &mut Tags, incoming: &Tags, _: &str| {
            calls += 1;
            union(existing, incoming, "")
        };
        for _ in 0..2 {
            db.insert_rlid_way(
                &Way::new(
                    "R1",
                    pts(vec![(0.0, 0.0), (30.0, 0.0)]),
                    tags(vec![("x", "1")]),
                ),
                "x",
                &mut policy,
                &mut timer,
            )
            .unwrap();
        }
        drop(policy);
        // Once per insert, since both cover the whole reference in one span
        assert_eq!(calls, 2);
        assert_eq!(db.way_db[&Rlid::from("R1")].len(), 1);
    }
}
