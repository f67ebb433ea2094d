use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};

use crate::{RefWayId, Rlid, Segment, WayDatabase};

impl WayDatabase {
    /// Check the segments of one RLID: ordered and not overlapping, each a run of at least two
    /// consecutive points of one reference way, spaced at least point_snap_distance apart. Along
    /// every reference way of the RLID, the segments must chain end to start with no gaps, from
    /// the first reference point to the last.
    pub fn test_segment_chain(&self, rlid: &Rlid) -> Result<()> {
        let segs = self
            .way_db
            .get(rlid)
            .map(|segs| segs.as_slice())
            .unwrap_or(&[]);
        for pair in segs.windows(2) {
            let (prev, next) = (self.dist(pair[0].last())?, self.dist(pair[1].first())?);
            if next < prev {
                error!("RLID {}: {:?}", rlid, segs);
                bail!(
                    "Segments of RLID {} out of order: one ends at {}, the next starts at {}",
                    rlid,
                    prev,
                    next
                );
            }
        }

        let mut per_way: BTreeMap<RefWayId, Vec<&Segment>> = BTreeMap::new();
        for seg in segs {
            if seg.pts.len() < 2 {
                bail!("RLID {} has a segment with {} points", rlid, seg.pts.len());
            }
            let key = match self
                .reference_ways(rlid)
                .iter()
                .find(|key| self.ref_gs.way_pts(**key).contains(&seg.first()))
            {
                Some(key) => *key,
                None => bail!(
                    "Segment of RLID {} starting at {} isn't on its reference geometry",
                    rlid,
                    self.pt(seg.first())
                ),
            };
            let ref_ids = self.ref_gs.way_pts(key);
            let mut cursor = ref_ids
                .iter()
                .position(|id| *id == seg.first())
                .unwrap_or(0);
            for (idx, id) in seg.pts.iter().enumerate() {
                if idx > 0 {
                    let step = self.pt(seg.pts[idx - 1]).dist_to(self.pt(*id));
                    if step < self.cfg.point_snap_distance {
                        bail!(
                            "RLID {} has points only {}m apart at {}",
                            rlid,
                            step,
                            self.pt(*id)
                        );
                    }
                }
                if cursor >= ref_ids.len() {
                    bail!("Segment of RLID {} runs past its reference way", rlid);
                }
                if ref_ids[cursor] != *id {
                    bail!(
                        "Segment of RLID {} skips reference points: dist {} where {} was expected",
                        rlid,
                        self.dist(*id)?,
                        self.dist(ref_ids[cursor])?
                    );
                }
                cursor += 1;
            }
            per_way.entry(key).or_insert_with(Vec::new).push(seg);
        }

        for key in self.reference_ways(rlid) {
            let ref_ids = self.ref_gs.way_pts(*key);
            let chain = per_way.get(key).map(|c| c.as_slice()).unwrap_or(&[]);
            let (first, last) = match (chain.first(), chain.last()) {
                (Some(first), Some(last)) => (first, last),
                _ => bail!(
                    "Nothing covers the reference way of RLID {} starting at {}",
                    rlid,
                    self.pt(ref_ids[0])
                ),
            };
            if first.first() != ref_ids[0] {
                bail!(
                    "Segments of RLID {} start at dist {}, not at the start of the reference",
                    rlid,
                    self.dist(first.first())?
                );
            }
            if last.last() != ref_ids[ref_ids.len() - 1] {
                bail!(
                    "Segments of RLID {} end at dist {}, short of the end of the reference at {}",
                    rlid,
                    self.dist(last.last())?,
                    self.dist(ref_ids[ref_ids.len() - 1])?
                );
            }
            for pair in chain.windows(2) {
                if pair[0].last() != pair[1].first() {
                    bail!(
                        "Segments of RLID {} leave a gap from dist {} to {}",
                        rlid,
                        self.dist(pair[0].last())?,
                        self.dist(pair[1].first())?
                    );
                }
            }
        }
        Ok(())
    }

    pub fn test_segments(&self) -> Result<()> {
        let rlids: BTreeSet<&Rlid> = self.way_db.keys().chain(self.ref_way_db.keys()).collect();
        for rlid in rlids {
            self.test_segment_chain(rlid)?;
        }
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

    fn overwrite(existing: &mut Tags, incoming: &Tags, _: &str) {
        for (k, v) in incoming.inner() {
            existing.insert(k.clone(), v.clone());
        }
    }

    // Segments for 0-10, 10-20 and 20-30
    fn three_segments() -> WayDatabase {
        let mut db = WayDatabase::new(
            Config::default(),
            vec![Way::new(
                "R1",
                pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)]),
                Tags::empty(),
            )],
            &mut Timer::throwaway(),
        )
        .unwrap();
        let mut policy = overwrite;
        for (from, to) in [(0.0, 10.0), (20.0, 30.0)] {
            let tags: Tags = vec![("x", "1")].into_iter().collect();
            db.insert_rlid_way(
                &Way::new("R1", pts(vec![(from, 0.0), (to, 0.0)]), tags),
                "layer",
                &mut policy,
                &mut Timer::throwaway(),
            )
            .unwrap();
        }
        assert_eq!(db.way_db[&Rlid::from("R1")].len(), 3);
        db
    }

    #[test]
    fn fresh_reference_is_one_untagged_segment() {
        let db = WayDatabase::new(
            Config::default(),
            vec![Way::new(
                "R1",
                pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]),
                Tags::empty(),
            )],
            &mut Timer::throwaway(),
        )
        .unwrap();
        let segs = &db.way_db[&Rlid::from("R1")];
        assert_eq!(segs.len(), 1);
        assert!(segs[0].tags.is_empty());
        assert_eq!(segs[0].pts, db.ref_gs().way_pts(db.reference_ways(&Rlid::from("R1"))[0]));
        db.test_segments().unwrap();
    }

    #[test]
    fn gap_in_the_middle_is_caught() {
        let mut db = three_segments();
        db.test_segments().unwrap();
        db.way_db.get_mut(&Rlid::from("R1")).unwrap().remove(1);
        let err = db.test_segments().unwrap_err();
        assert!(err.to_string().contains("gap"));
    }

    #[test]
    fn chain_must_reach_both_ends() {
        let mut db = three_segments();
        db.way_db.get_mut(&Rlid::from("R1")).unwrap().remove(0);
        assert!(db.test_segment_chain(&Rlid::from("R1")).is_err());

        let mut db = three_segments();
        db.way_db.get_mut(&Rlid::from("R1")).unwrap().pop();
        assert!(db.test_segment_chain(&Rlid::from("R1")).is_err());

        let mut db = three_segments();
        db.way_db.remove(&Rlid::from("R1"));
        assert!(db.test_segments().is_err());
    }
}
