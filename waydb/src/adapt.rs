use anyhow::Result;

use abstutil::{Tags, Timer};
use geom::Pt2D;

use crate::reference::remove_short_segments_and_redundant_points;
use crate::{PointFeature, PointId, RefWayId, Rlid, Segment, TagPolicy, Way, WayDatabase};

/// The outcome of fitting one layer feature onto the reference network.
#[derive(Clone, Debug, PartialEq)]
pub enum Adaptation {
    /// Contiguous runs of reference points. Empty if the feature collapsed to nothing.
    Adapted(Vec<Segment>),
    /// Some vertex had no reference geometry within range; the reference may be too short.
    NeedsExtension,
    Failed(String),
}

impl WayDatabase {
    /// Fit a line feature onto the reference way for its RLID and merge it into the working
    /// network. A feature that doesn't fit within max_snap_distance first gets the reference way
    /// extended to cover it, then is retried within emergency_snap_distance, and finally dropped
    /// with a warning. Returns false if the feature was skipped or dropped.
    pub fn insert_rlid_way<P: TagPolicy>(
        &mut self,
        way: &Way,
        source: &str,
        policy: &mut P,
        timer: &mut Timer,
    ) -> Result<bool> {
        if !self.ref_way_db.contains_key(&way.rlid) {
            timer.warn(format!(
                "RLID {} from {} isn't in the reference geometry; skipping it",
                way.rlid, source
            ));
            self.stats.skipped += 1;
            return Ok(false);
        }

        let mut result = self.adapt_way(way, self.cfg.max_snap_distance, policy, timer)?;
        self.repair_touched()?;
        if result == Adaptation::NeedsExtension && self.extend_reference_for(way, timer)? {
            self.stats.extended += 1;
            self.repair_touched()?;
            self.cover_reference(&way.rlid)?;
            result = self.adapt_way(way, self.cfg.max_snap_distance, policy, timer)?;
            self.repair_touched()?;
        }
        if !matches!(result, Adaptation::Adapted(_)) {
            timer.warn(format!(
                "RLID {} from {} doesn't fit the reference geometry within {}m; trying {}m",
                way.rlid, source, self.cfg.max_snap_distance, self.cfg.emergency_snap_distance
            ));
            result = self.adapt_way(way, self.cfg.emergency_snap_distance, policy, timer)?;
            self.repair_touched()?;
            if matches!(result, Adaptation::Adapted(_)) {
                self.stats.emergency += 1;
            }
        }

        let segs = match result {
            Adaptation::Adapted(segs) => segs,
            Adaptation::NeedsExtension => {
                timer.warn(format!(
                    "Dropping RLID {} from {}: no reference geometry within {}m",
                    way.rlid, source, self.cfg.emergency_snap_distance
                ));
                self.stats.dropped += 1;
                return Ok(false);
            }
            Adaptation::Failed(reason) => {
                timer.warn(format!(
                    "Dropping RLID {} from {}: {}",
                    way.rlid, source, reason
                ));
                self.stats.dropped += 1;
                return Ok(false);
            }
        };
        for seg in segs {
            self.split_and_merge(seg, source, policy)?;
        }
        if self.cfg.perform_self_testing {
            self.test_segment_chain(&way.rlid)?;
        }
        self.stats.inserted += 1;
        Ok(true)
    }

    /// Snap a point feature onto the network and merge it into `point_db`. A point that's
    /// projected onto a line gets spliced into that reference way, and into any segment already
    /// covering that stretch. A point that can't be snapped is kept where it is, and this returns
    /// false.
    pub fn insert_rlid_node<P: TagPolicy>(
        &mut self,
        node: &PointFeature,
        source: &str,
        do_snap: bool,
        policy: &mut P,
        timer: &mut Timer,
    ) -> Result<bool> {
        let mut feature = node.clone();
        let mut did_snap = false;
        if do_snap {
            match self.ref_gs.snap_point_into_geometry(
                node.pt,
                self.cfg.point_snap_distance,
                self.cfg.max_snap_distance,
            )? {
                Some(snap) => {
                    if snap.dist > self.cfg.point_snap_distance {
                        debug!(
                            "Point with RLID {} from {} moved {}m to {}",
                            node.rlid, source, snap.dist, snap.pt
                        );
                    }
                    feature.pt = snap.pt;
                    did_snap = true;
                    if snap.spliced.is_some() {
                        self.repair_touched()?;
                    }
                    self.stats.snapped += 1;
                }
                None => {
                    timer.warn(format!(
                        "Point with RLID {} from {} at {} has no geometry within {}m",
                        node.rlid, source, node.pt, self.cfg.max_snap_distance
                    ));
                    self.stats.unsnapped += 1;
                }
            }
        }

        match self.point_db.get_mut(&feature.pt.to_hashable()) {
            Some(existing) => {
                let current = &mut existing[0];
                if current.rlid != feature.rlid {
                    debug!(
                        "Point with RLID {} at {} already has one with RLID {}",
                        feature.rlid, feature.pt, current.rlid
                    );
                }
                policy.merge(&mut current.tags, &feature.tags, source);
            }
            None => {
                self.point_db
                    .insert(feature.pt.to_hashable(), vec![feature]);
            }
        }
        self.stats.inserted += 1;
        Ok(did_snap)
    }

    /// Snap every vertex of a way onto the reference way for its RLID.
    pub fn adapt_way<P: TagPolicy>(
        &mut self,
        way: &Way,
        loose_r: f64,
        policy: &P,
        timer: &mut Timer,
    ) -> Result<Adaptation> {
        let pts = match remove_short_segments_and_redundant_points(
            &way.pts,
            self.cfg.point_snap_distance,
            |_| false,
        ) {
            Ok(pts) => pts,
            Err(err) => return Ok(Adaptation::Failed(err.to_string())),
        };
        if pts.len() < 2 {
            return Ok(Adaptation::Adapted(Vec::new()));
        }

        let mut ids: Vec<PointId> = Vec::new();
        let mut ref_key = None;
        for idx in 0..pts.len() {
            let (id, key) = match self.ref_gs.snap_waypoint_into_geometry(
                &pts,
                &way.rlid,
                idx,
                self.cfg.point_snap_distance,
                loose_r,
                &ids,
            )? {
                Some(found) => found,
                None => return Ok(Adaptation::NeedsExtension),
            };
            if ref_key.map(|k| k != key).unwrap_or(false) {
                return Ok(Adaptation::Failed(format!(
                    "it spans more than one piece of reference geometry for RLID {}",
                    way.rlid
                )));
            }
            ref_key = Some(key);
            if self.cfg.perform_self_testing {
                self.ref_gs.test_way_dist(key)?;
            }
            if ids
                .last()
                .map(|last| self.ref_gs.pt(*last) != self.ref_gs.pt(id))
                .unwrap_or(true)
            {
                ids.push(id);
            }
        }

        match ref_key {
            Some(key) if ids.len() >= 2 => {
                self.finish_adaptation(&way.rlid, key, ids, &way.tags, policy, timer)
            }
            _ => Ok(Adaptation::Adapted(Vec::new())),
        }
    }

    // Orient the snapped ids along the reference, deal with closed loops, and fill in every
    // reference point in between.
    fn finish_adaptation<P: TagPolicy>(
        &self,
        rlid: &Rlid,
        key: RefWayId,
        mut ids: Vec<PointId>,
        tags: &Tags,
        policy: &P,
        timer: &mut Timer,
    ) -> Result<Adaptation> {
        if ids.len() < 2 {
            return Ok(Adaptation::Adapted(Vec::new()));
        }
        let ref_ids = self.ref_gs.way_pts(key);
        let (r0, rn) = (ref_ids[0], ref_ids[ref_ids.len() - 1]);
        let pt = |id: PointId| self.ref_gs.pt(id);
        let mut reversed = false;

        if pt(r0) == pt(rn) {
            let mut closed = false;
            let n = ids.len();
            if pt(ids[0]) == pt(ids[n - 1]) {
                closed = true;
                ids.pop();
            } else if pt(ids[n - 1]) == pt(r0) {
                ids[n - 1] = rn;
            } else if self.dist(ids[0])? > self.dist(ids[n - 1])? {
                // Runs across the seam of the loop; handle each side separately
                let mut split = None;
                for idx in 1..ids.len() {
                    if pt(ids[idx]) == pt(r0) {
                        let mut part1 = ids[..idx].to_vec();
                        part1.push(rn);
                        let mut part2 = vec![r0];
                        part2.extend(&ids[idx + 1..]);
                        split = Some((part1, part2));
                        break;
                    }
                    if self.dist(ids[idx - 1])? > self.dist(ids[idx])? {
                        let mut part1 = ids[..idx].to_vec();
                        part1.push(rn);
                        let mut part2 = vec![r0];
                        part2.extend(&ids[idx..]);
                        split = Some((part1, part2));
                        break;
                    }
                }
                let (part1, part2) = match split {
                    Some(parts) => parts,
                    None => {
                        return Ok(Adaptation::Failed(format!(
                            "couldn't find where RLID {} crosses the seam of its loop",
                            rlid
                        )))
                    }
                };
                let mut segs = Vec::new();
                for part in [part1, part2] {
                    match self.finish_adaptation(rlid, key, part, tags, policy, timer)? {
                        Adaptation::Adapted(s) => segs.extend(s),
                        other => return Ok(other),
                    }
                }
                return Ok(Adaptation::Adapted(segs));
            }

            let mut min_idx = 0;
            for idx in 1..ids.len() {
                if self.dist(ids[idx])? < self.dist(ids[min_idx])? {
                    min_idx = idx;
                }
            }
            ids.rotate_left(min_idx);
            if closed {
                if pt(ids[0]) != pt(r0) {
                    ids.insert(0, r0);
                } else {
                    ids[0] = r0;
                }
                ids.push(rn);
            }
        } else {
            // A P-shaped reference way touches itself, so some coordinates have two ids. Which
            // visit a snapped point got depends on the direction it was digitized in, so only
            // trust the unambiguous points to tell the direction.
            let revisited =
                |id: PointId| ref_ids.iter().filter(|r| pt(**r) == pt(id)).count() > 1;
            let plain: Vec<PointId> = ids.iter().cloned().filter(|id| !revisited(*id)).collect();
            let (head, tail) = if plain.len() >= 2 {
                (plain[0], plain[plain.len() - 1])
            } else {
                (ids[0], ids[ids.len() - 1])
            };
            if self.dist(head)? > self.dist(tail)? {
                timer.warn(format!(
                    "RLID {} is digitized against its reference way; reversing it",
                    rlid
                ));
                ids.reverse();
                reversed = true;
            }

            // Now each revisited coordinate takes the first visit past the previous point
            let mut prev_dist = f64::NEG_INFINITY;
            for idx in 0..ids.len() {
                if revisited(ids[idx]) {
                    let mut best: Option<(f64, PointId)> = None;
                    for id in ref_ids {
                        if pt(*id) != pt(ids[idx]) {
                            continue;
                        }
                        let dist = self.dist(*id)?;
                        if dist >= prev_dist && best.map(|(d, _)| dist < d).unwrap_or(true) {
                            best = Some((dist, *id));
                        }
                    }
                    if let Some((_, id)) = best {
                        if id != ids[idx] {
                            debug!(
                                "RLID {} passes {} twice; picking the visit in order",
                                rlid,
                                pt(id)
                            );
                            ids[idx] = id;
                        }
                    }
                }
                prev_dist = self.dist(ids[idx])?;
            }
        }

        let start = match ref_ids.iter().position(|id| *id == ids[0]) {
            Some(idx) => idx,
            None => {
                return Ok(Adaptation::Failed(format!(
                    "{} isn't on the reference way for RLID {}",
                    pt(ids[0]),
                    rlid
                )))
            }
        };
        let mut dense = Vec::new();
        let mut cursor = start;
        for id in &ids {
            loop {
                if cursor >= ref_ids.len() {
                    return Ok(Adaptation::Failed(format!(
                        "RLID {} doubles back along its reference way at {}",
                        rlid,
                        pt(*id)
                    )));
                }
                dense.push(ref_ids[cursor]);
                cursor += 1;
                if ref_ids[cursor - 1] == *id {
                    break;
                }
            }
        }
        if dense.len() < 2 {
            return Ok(Adaptation::Adapted(Vec::new()));
        }

        let mut tags = tags.clone();
        if reversed {
            policy.reverse_tags(&mut tags);
        }
        Ok(Adaptation::Adapted(vec![Segment::new(
            rlid.clone(),
            dense,
            tags,
        )]))
    }

    // Snap what we can of a way that didn't fit. If only its ends hang off the reference way,
    // grow the reference way to cover them.
    fn extend_reference_for(&mut self, way: &Way, timer: &mut Timer) -> Result<bool> {
        let pts = match remove_short_segments_and_redundant_points(
            &way.pts,
            self.cfg.point_snap_distance,
            |_| false,
        ) {
            Ok(pts) => pts,
            Err(_) => return Ok(false),
        };

        let mut new_pts: Vec<Pt2D> = Vec::new();
        let mut snapped: Vec<bool> = Vec::new();
        let mut built: Vec<PointId> = Vec::new();
        let mut ref_key = None;
        for idx in 0..pts.len() {
            if let Some((id, key)) = self.ref_gs.snap_waypoint_into_geometry(
                &pts,
                &way.rlid,
                idx,
                self.cfg.point_snap_distance,
                self.cfg.max_snap_distance,
                &built,
            )? {
                new_pts.push(self.ref_gs.pt(id));
                built.push(id);
                snapped.push(true);
                ref_key = Some(key);
                continue;
            }
            // Stick to other geometry if it's right there
            match self.ref_gs.snap_point_into_geometry(
                pts[idx],
                self.cfg.point_snap_distance,
                self.cfg.point_snap_distance,
            )? {
                Some(snap) => new_pts.push(snap.pt),
                None => new_pts.push(pts[idx]),
            }
            snapped.push(false);
        }

        let key = match ref_key {
            Some(key) => key,
            None => {
                debug!("Nothing of RLID {} snaps to its reference way", way.rlid);
                return Ok(false);
            }
        };
        let first_snap = snapped.iter().position(|s| *s).unwrap_or(0);
        let last_snap = snapped
            .iter()
            .rposition(|s| *s)
            .unwrap_or(snapped.len() - 1);
        if snapped[first_snap..=last_snap].iter().any(|s| !*s) {
            debug!(
                "RLID {} doesn't fit its reference way in the middle, not just at the ends",
                way.rlid
            );
            return Ok(false);
        }

        timer.warn(format!(
            "Extending the reference geometry for RLID {} ({} of {} points snapped)",
            way.rlid,
            snapped.iter().filter(|s| **s).count(),
            snapped.len()
        ));
        let mut extended = false;
        if first_snap > 0 {
            let extension = new_pts[..=first_snap].to_vec();
            extended |= self.ref_gs.extend_geometry(key, &extension)?;
        }
        if last_snap < new_pts.len() - 1 {
            let extension = new_pts[last_snap..].to_vec();
            extended |= self.ref_gs.extend_geometry(key, &extension)?;
        }
        Ok(extended)
    }

    // Splicing a vertex into a reference way leaves segments covering that stretch with a gap in
    // their run of reference points. Fill them back in.
    pub(crate) fn repair_touched(&mut self) -> Result<()> {
        for key in self.ref_gs.take_touched() {
            let rlid = match self.ref_gs.rlid(key) {
                Some(rlid) => rlid.clone(),
                None => continue,
            };
            let ref_ids = self.ref_gs.way_pts(key);
            if let Some(segs) = self.way_db.get_mut(&rlid) {
                for seg in segs {
                    let start = ref_ids.iter().position(|id| *id == seg.first());
                    let end = ref_ids.iter().rposition(|id| *id == seg.last());
                    if let (Some(start), Some(end)) = (start, end) {
                        if start < end && end - start + 1 != seg.pts.len() {
                            seg.pts = ref_ids[start..=end].to_vec();
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
