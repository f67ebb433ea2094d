use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use anyhow::{bail, Result};

use geom::{HashablePt2D, Line, Pt2D, ON_LINE_TOLERANCE};

use crate::{PointArena, PointId, Rlid, TwoDimSearch};

/// Consecutive vertices of an indexed way are never closer than this.
const MIN_VERTEX_SPACING: f64 = 0.05;
/// Allowed drift between the stored `dist` deltas and the real step lengths.
const DIST_EPSILON: f64 = 1e-6;

#[derive(Clone, Debug)]
struct IndexedWay {
    rlid: Rlid,
    pts: Vec<PointId>,
}

/// The result of snapping a free point onto indexed geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Snap<K> {
    /// How far the point moved.
    pub dist: f64,
    pub pt: Pt2D,
    /// Set if a new vertex had to be spliced into a way.
    pub spliced: Option<(K, PointId)>,
}

/// Spatial search and linear referencing over a set of ways. Exact vertices go in one index;
/// synthetic fill points along long edges go in another, so every point within
/// `max_segment_length` of an edge finds that edge with a bounded box query.
///
/// With `use_dist`, every vertex gets a cumulative distance along its way. Several pieces with
/// the same RLID share one distance space: each piece starts past where the previous one ended.
pub struct GeometrySearch<K: Copy + Ord + Debug> {
    max_segment_length: f64,
    use_dist: bool,
    perform_self_testing: bool,

    arena: PointArena,
    ways: BTreeMap<K, IndexedWay>,
    realpoints: TwoDimSearch<K>,
    fillpoints: TwoDimSearch<K>,
    // Coordinates one way visits more than once, not counting the seam of a closed loop
    self_cross_points: BTreeMap<HashablePt2D, BTreeSet<K>>,
    // Where the next piece of an RLID starts its dist
    rlid_start_dist: BTreeMap<Rlid, f64>,
    // Ways that had a vertex spliced in since the last take_touched()
    touched: BTreeSet<K>,
}

impl<K: Copy + Ord + Debug> GeometrySearch<K> {
    pub fn new(max_segment_length: f64, use_dist: bool, perform_self_testing: bool) -> Self {
        GeometrySearch {
            max_segment_length,
            use_dist,
            perform_self_testing,
            arena: PointArena::new(),
            ways: BTreeMap::new(),
            realpoints: TwoDimSearch::new(),
            fillpoints: TwoDimSearch::new(),
            self_cross_points: BTreeMap::new(),
            rlid_start_dist: BTreeMap::new(),
            touched: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, key: K, rlid: Rlid, pts: &[Pt2D]) -> Result<()> {
        if self.ways.contains_key(&key) {
            bail!("{:?} is already indexed", key);
        }
        if pts.len() < 2 {
            bail!("{:?} for RLID {} has only {} points", key, rlid, pts.len());
        }
        let ids = pts.iter().map(|pt| self.arena.add(*pt, None)).collect();
        self.ways.insert(key, IndexedWay { rlid, pts: ids });
        self.index_way(key)
    }

    fn index_way(&mut self, key: K) -> Result<()> {
        let (rlid, ids) = match self.ways.get(&key) {
            Some(way) => (way.rlid.clone(), way.pts.clone()),
            None => bail!("{:?} isn't indexed", key),
        };
        let first_pt = self.arena.pt(ids[0]);
        let closed = first_pt == self.arena.pt(ids[ids.len() - 1]);
        let mut visited = BTreeSet::new();

        for (idx, id) in ids.iter().enumerate() {
            let pt = self.arena.pt(*id);
            self.realpoints.insert(pt, key);
            if self.use_dist {
                if self.arena.dist(*id).is_some() {
                    error!("{:?} for RLID {}: {:?}", key, rlid, self.way_pts(key));
                    bail!("{} of {:?} already has its dist set", pt, key);
                }
                let dist = if idx == 0 {
                    self.rlid_start_dist.get(&rlid).cloned().unwrap_or(0.0)
                } else {
                    let prev = ids[idx - 1];
                    if visited.contains(&pt.to_hashable()) && !(closed && pt == first_pt) {
                        debug!("RLID {} crosses itself at {}", rlid, pt);
                        self.self_cross_points
                            .entry(pt.to_hashable())
                            .or_insert_with(BTreeSet::new)
                            .insert(key);
                    }
                    self.arena.tracked_dist(prev)? + self.arena.pt(prev).dist_to(pt)
                };
                self.arena.set_dist(*id, Some(dist));
                visited.insert(pt.to_hashable());
            }
            if idx > 0 {
                self.insert_fill_points(key, self.arena.pt(ids[idx - 1]), pt);
            }
        }

        if self.use_dist {
            let last_dist = self.arena.tracked_dist(ids[ids.len() - 1])?;
            self.rlid_start_dist.insert(rlid, last_dist.ceil() + 1.0);
        }
        Ok(())
    }

    fn insert_fill_points(&mut self, key: K, pt1: Pt2D, pt2: Pt2D) {
        let len = pt1.dist_to(pt2);
        if len < self.max_segment_length {
            return;
        }
        let count = (len / self.max_segment_length).ceil() as usize;
        let dx = (pt2.x() - pt1.x()) / (count as f64);
        let dy = (pt2.y() - pt1.y()) / (count as f64);
        for i in 1..count {
            self.fillpoints
                .insert(pt1.offset((i as f64) * dx, (i as f64) * dy), key);
        }
    }

    /// Snap a free point: to an existing vertex within `tight_r` if possible, otherwise onto the
    /// closest line within `loose_r`. Projecting onto a line splices a new vertex into that way,
    /// unless an existing vertex is closer than `tight_r`, in which case it snaps there instead.
    pub fn snap_point_into_geometry(
        &mut self,
        pt: Pt2D,
        tight_r: f64,
        loose_r: f64,
    ) -> Result<Option<Snap<K>>> {
        if let Some((dist, found, _)) = self.realpoints.find_nearest_within(pt, tight_r, false) {
            return Ok(Some(Snap {
                dist,
                pt: found,
                spliced: None,
            }));
        }
        if let Some((dist, projected, key)) = self.snap_to_line(pt, None) {
            if dist < loose_r {
                let (id, spliced) = self.insert_point_into_geometry(projected, key, tight_r)?;
                return Ok(Some(Snap {
                    dist,
                    pt: self.arena.pt(id),
                    spliced: if spliced { Some((key, id)) } else { None },
                }));
            }
        }
        Ok(None)
    }

    /// Snap vertex `idx` of `pts` onto the way for `rlid`. `built` is what's been snapped so far
    /// for earlier vertices of the same way.
    ///
    /// Endpoints look at every candidate vertex within `tight_r` and prefer one that doesn't
    /// make the way shorter, picking the one closest to the original among those. Only if none
    /// qualify does a shortening candidate win. Where the reference way visits a coordinate more
    /// than once, the occurrence that keeps `dist` moving forward from `built` is used.
    pub fn snap_waypoint_into_geometry(
        &mut self,
        pts: &[Pt2D],
        rlid: &Rlid,
        idx: usize,
        tight_r: f64,
        loose_r: f64,
        built: &[PointId],
    ) -> Result<Option<(PointId, K)>> {
        if !self.use_dist {
            bail!("snap_waypoint_into_geometry needs linear referencing");
        }
        let pt = pts[idx];
        if let Some((found, key)) = self.find_vertex_preferring_longer(pts, rlid, idx, tight_r)? {
            let id = self.resolve_vertex(key, found, built)?;
            return Ok(Some((id, key)));
        }

        if let Some((dist, projected, key)) = self.snap_to_line(pt, Some(rlid)) {
            if dist < loose_r {
                let (id, _) = self.insert_point_into_geometry(projected, key, tight_r)?;
                return Ok(Some((id, key)));
            }
        }
        Ok(None)
    }

    fn find_vertex_preferring_longer(
        &self,
        pts: &[Pt2D],
        rlid: &Rlid,
        idx: usize,
        tight_r: f64,
    ) -> Result<Option<(Pt2D, K)>> {
        let pt = pts[idx];
        if idx > 0 && idx < pts.len() - 1 {
            if let Some((_, found, owners)) = self.realpoints.find_nearest_within(pt, tight_r, false)
            {
                if let Some(key) = self.filter_reference_way(owners, rlid)? {
                    return Ok(Some((found, key)));
                }
            }
            return Ok(None);
        }

        let neighbor = if idx == 0 { pts[1] } else { pts[idx - 1] };
        let orig_dist = pt.dist_sq_to(neighbor);
        let mut longer: Option<(f64, Pt2D, K)> = None;
        let mut shorter: Option<(f64, Pt2D, K)> = None;
        for (found, owners) in self.realpoints.find_all_within_list(pt, tight_r) {
            // The lookup covers a square
            if found.dist_to(pt) > tight_r {
                continue;
            }
            let key = match self.filter_reference_way(&owners, rlid)? {
                Some(key) => key,
                None => continue,
            };
            let deviation = found.dist_sq_to(pt);
            let best = if found.dist_sq_to(neighbor) >= orig_dist {
                &mut longer
            } else {
                &mut shorter
            };
            if best.map(|(d, _, _)| deviation < d).unwrap_or(true) {
                *best = Some((deviation, found, key));
            }
        }
        Ok(longer.or(shorter).map(|(_, found, key)| (found, key)))
    }

    // Which occurrence of a coordinate in a way to use
    fn resolve_vertex(&self, key: K, pt: Pt2D, built: &[PointId]) -> Result<PointId> {
        let occurrences: Vec<PointId> = self
            .way_pts(key)
            .iter()
            .cloned()
            .filter(|id| self.arena.pt(*id) == pt)
            .collect();
        if occurrences.is_empty() {
            bail!("{} isn't a vertex of {:?}", pt, key);
        }
        if let Some(last_built) = built.last() {
            if self
                .self_cross_points
                .get(&pt.to_hashable())
                .map(|ways| ways.contains(&key))
                .unwrap_or(false)
            {
                let built_dist = self.arena.tracked_dist(*last_built)?;
                for id in &occurrences {
                    if self.arena.tracked_dist(*id)? >= built_dist {
                        return Ok(*id);
                    }
                }
                return Ok(occurrences[occurrences.len() - 1]);
            }
        }
        Ok(occurrences[0])
    }

    // The closest vertex or projection onto a line among nearby ways, optionally restricted to
    // one RLID.
    fn snap_to_line(&self, pt: Pt2D, rlid: Option<&Rlid>) -> Option<(f64, Pt2D, K)> {
        let candidates = match rlid {
            None => {
                let mut keys = self
                    .realpoints
                    .find_all_within(pt, self.max_segment_length);
                keys.extend(self.fillpoints.find_all_within(pt, self.max_segment_length));
                keys
            }
            Some(rlid) => {
                let keys = self.with_rlid(
                    self.realpoints
                        .find_all_within(pt, self.max_segment_length),
                    rlid,
                );
                if keys.is_empty() {
                    self.with_rlid(
                        self.fillpoints
                            .find_all_within(pt, self.max_segment_length),
                        rlid,
                    )
                } else {
                    keys
                }
            }
        };

        let mut best: Option<(f64, Pt2D, K)> = None;
        for key in candidates {
            let ids = self.way_pts(key);
            for (idx, id) in ids.iter().enumerate() {
                // Check the vertices too, or sharp corners would never match
                let vertex = self.arena.pt(*id);
                let mut options = vec![vertex];
                if idx > 0 {
                    let line = Line::new(self.arena.pt(ids[idx - 1]), vertex);
                    options.extend(line.project_pt(pt));
                }
                for candidate in options {
                    let dist_sq = candidate.dist_sq_to(pt);
                    if best.map(|(d, _, _)| dist_sq < d).unwrap_or(true) {
                        best = Some((dist_sq, candidate, key));
                    }
                }
            }
        }
        best.map(|(dist_sq, candidate, key)| (dist_sq.sqrt(), candidate, key))
    }

    fn with_rlid(&self, keys: BTreeSet<K>, rlid: &Rlid) -> BTreeSet<K> {
        keys.into_iter()
            .filter(|key| self.ways.get(key).map(|w| &w.rlid == rlid).unwrap_or(false))
            .collect()
    }

    // Returns the vertex used, and whether it was newly spliced in.
    fn insert_point_into_geometry(
        &mut self,
        pt: Pt2D,
        key: K,
        min_distance: f64,
    ) -> Result<(PointId, bool)> {
        if self.perform_self_testing {
            self.test_way_dist(key)?;
        }
        let ids = self.way_pts(key).to_vec();
        for idx in 1..ids.len() {
            let prev = self.arena.pt(ids[idx - 1]);
            let next = self.arena.pt(ids[idx]);
            if !Line::new(prev, next).contains_pt(pt, ON_LINE_TOLERANCE) {
                continue;
            }
            let dist1 = prev.dist_to(pt);
            let dist2 = next.dist_to(pt);
            if dist1 >= min_distance && dist2 >= min_distance {
                let dist = if self.use_dist {
                    Some(self.arena.tracked_dist(ids[idx - 1])? + dist1)
                } else {
                    None
                };
                let id = self.arena.add(pt, dist);
                if let Some(way) = self.ways.get_mut(&key) {
                    way.pts.insert(idx, id);
                }
                self.realpoints.insert(pt, key);
                self.touched.insert(key);
                if self.perform_self_testing {
                    self.test_way_dist(key)?;
                }
                return Ok((id, true));
            }
            return Ok(if dist1 < dist2 {
                (ids[idx - 1], false)
            } else {
                (ids[idx], false)
            });
        }
        bail!("no place to insert {} into {:?}", pt, key)
    }

    /// Grow a way at its start or end. The extension must begin where the way ends (or end where
    /// it starts), or the way's endpoint must lie on the extension's first (or last) line.
    /// Returns false if it doesn't connect. Every way with the same RLID gets its `dist`
    /// recalculated, and anything holding their `PointId`s sees the new values.
    pub fn extend_geometry(&mut self, key: K, extension: &[Pt2D]) -> Result<bool> {
        if extension.len() < 2 {
            return Ok(false);
        }
        let ids = self.way_pts(key).to_vec();
        if ids.is_empty() {
            bail!("can't extend {:?}, it isn't indexed", key);
        }
        let first = self.arena.pt(ids[0]);
        let last = self.arena.pt(ids[ids.len() - 1]);
        let ext_first = extension[0];
        let ext_last = extension[extension.len() - 1];
        let n = extension.len();

        let append = ext_first == last
            || Line::new(extension[0], extension[1])
                .project_pt(last)
                .is_some();
        let prepend = !append
            && (ext_last == first
                || Line::new(extension[n - 2], extension[n - 1])
                    .project_pt(first)
                    .is_some());
        if !append && !prepend {
            debug!("Extension of {:?} doesn't connect", key);
            return Ok(false);
        }

        let new_ids: Vec<PointId> = if append {
            extension[1..]
                .iter()
                .map(|pt| self.arena.add(*pt, None))
                .collect()
        } else {
            extension[..n - 1]
                .iter()
                .map(|pt| self.arena.add(*pt, None))
                .collect()
        };
        let rlid = match self.ways.get_mut(&key) {
            Some(way) => {
                if append {
                    way.pts.extend(new_ids);
                } else {
                    let mut pts = new_ids;
                    pts.append(&mut way.pts);
                    way.pts = pts;
                }
                way.rlid.clone()
            }
            None => bail!("{:?} isn't indexed", key),
        };

        let same_rlid: Vec<K> = self
            .ways
            .iter()
            .filter(|(_, way)| way.rlid == rlid)
            .map(|(k, _)| *k)
            .collect();
        if self.use_dist {
            self.rlid_start_dist.remove(&rlid);
            for k in &same_rlid {
                for id in self.way_pts(*k).to_vec() {
                    self.arena.set_dist(id, None);
                }
            }
        }
        for k in same_rlid {
            self.index_way(k)?;
            if self.use_dist && self.perform_self_testing {
                self.test_way_dist(k)?;
            }
        }
        Ok(true)
    }

    /// Check a distance-tracked way: no repeated or too-close consecutive vertices, and the
    /// `dist` deltas match the real step lengths.
    pub fn test_way_dist(&self, key: K) -> Result<()> {
        if !self.use_dist {
            bail!("test_way_dist needs linear referencing");
        }
        let ids = self.way_pts(key);
        if ids.is_empty() {
            bail!("{:?} isn't indexed", key);
        }
        let mut expected = self.arena.tracked_dist(ids[0])?;
        if expected < 0.0 {
            bail!("{:?} starts at negative dist {}", key, expected);
        }
        for pair in ids.windows(2) {
            let prev = self.arena.pt(pair[0]);
            let pt = self.arena.pt(pair[1]);
            if prev == pt {
                error!("{:?}: {:?}", key, self.way_coords(key));
                bail!("Duplicate point {} in {:?}", pt, key);
            }
            let step = prev.dist_to(pt);
            if step < MIN_VERTEX_SPACING {
                error!("{:?}: {:?}", key, self.way_coords(key));
                bail!("Points only {}m apart at {} in {:?}", step, pt, key);
            }
            expected += step;
            let actual = self.arena.tracked_dist(pair[1])?;
            if (actual - expected).abs() > DIST_EPSILON {
                error!("{:?}: {:?}", key, self.way_coords(key));
                bail!(
                    "Bad dist at {} in {:?}: expected {}, got {}",
                    pt,
                    key,
                    expected,
                    actual
                );
            }
            expected = actual;
        }
        Ok(())
    }

    /// Every way whose vertices or fill points are near any of `pts`.
    pub fn find_all_nearby_ways(&self, pts: &[Pt2D]) -> BTreeSet<K> {
        let mut keys = BTreeSet::new();
        for pt in pts {
            keys.extend(self.realpoints.find_all_within(*pt, self.max_segment_length));
            keys.extend(self.fillpoints.find_all_within(*pt, self.max_segment_length));
        }
        keys
    }

    /// Ways with a vertex exactly at `pt`.
    pub fn find_all_connecting_ways(&self, pt: Pt2D) -> BTreeSet<K> {
        self.realpoints.get(pt).cloned().unwrap_or_default()
    }

    /// The one way for `rlid` with a vertex exactly at `pt`. Several is an error.
    pub fn find_reference_way(&self, pt: Pt2D, rlid: &Rlid) -> Result<Option<K>> {
        match self.realpoints.get(pt) {
            Some(owners) => self.filter_reference_way(owners, rlid),
            None => Ok(None),
        }
    }

    fn filter_reference_way(&self, owners: &BTreeSet<K>, rlid: &Rlid) -> Result<Option<K>> {
        let mut found = None;
        for key in owners {
            if self.ways.get(key).map(|w| &w.rlid == rlid).unwrap_or(false) {
                if found.is_some() {
                    bail!("Multiple copies of RLID {} in reference geometry", rlid);
                }
                found = Some(*key);
            }
        }
        Ok(found)
    }

    /// Other ways that `pts` crosses, with the first crossing point found for each.
    pub fn find_crossing_ways(
        &self,
        pts: &[Pt2D],
        exclude: Option<K>,
        abort_at_first: bool,
    ) -> Vec<(K, Pt2D)> {
        let lines: Vec<Line> = pts.windows(2).map(|p| Line::new(p[0], p[1])).collect();
        let mut crossings = Vec::new();
        for key in self.find_all_nearby_ways(pts) {
            if Some(key) == exclude {
                continue;
            }
            let other = self.way_coords(key);
            let found = other.windows(2).find_map(|pair| {
                let line = Line::new(pair[0], pair[1]);
                lines.iter().find_map(|l| l.crossing(&line))
            });
            if let Some(pt) = found {
                crossings.push((key, pt));
                if abort_at_first {
                    return crossings;
                }
            }
        }
        crossings
    }

    /// Shared vertices near `pt` where more than one line passes through. A way passing through
    /// as a midpoint is one line; ways ending there pair up into lines, and a leftover single end
    /// (the stem of a T) doesn't count.
    pub fn find_crossing_points_within(&self, pt: Pt2D, radius: f64) -> Vec<(Pt2D, BTreeSet<K>)> {
        let mut result = Vec::new();
        for (found, owners) in self.realpoints.find_all_within_list(pt, radius) {
            if owners.len() == 1 {
                continue;
            }
            let mut ends = 0;
            let mut midpoints = 0;
            for key in &owners {
                let ids = self.way_pts(*key);
                if ids.is_empty() {
                    continue;
                }
                let is_end =
                    self.arena.pt(ids[0]) == found || self.arena.pt(ids[ids.len() - 1]) == found;
                if is_end {
                    ends += 1;
                } else {
                    midpoints += 1;
                }
            }
            if midpoints + ends / 2 > 1 {
                result.push((found, owners));
            }
        }
        result
    }

    pub fn rlid(&self, key: K) -> Option<&Rlid> {
        self.ways.get(&key).map(|w| &w.rlid)
    }

    /// The vertices of a way, or nothing if it isn't indexed.
    pub fn way_pts(&self, key: K) -> &[PointId] {
        self.ways
            .get(&key)
            .map(|w| w.pts.as_slice())
            .unwrap_or(&[])
    }

    pub fn way_coords(&self, key: K) -> Vec<Pt2D> {
        self.way_pts(key)
            .iter()
            .map(|id| self.arena.pt(*id))
            .collect()
    }

    pub fn ways(&self) -> impl Iterator<Item = (K, &Rlid, &[PointId])> {
        self.ways
            .iter()
            .map(|(k, w)| (*k, &w.rlid, w.pts.as_slice()))
    }

    pub fn pt(&self, id: PointId) -> Pt2D {
        self.arena.pt(id)
    }

    pub fn dist(&self, id: PointId) -> Result<f64> {
        self.arena.tracked_dist(id)
    }

    pub fn is_self_crossing_point(&self, pt: Pt2D) -> bool {
        self.self_cross_points.contains_key(&pt.to_hashable())
    }

    /// Ways that received a spliced vertex since the last call.
    pub fn take_touched(&mut self) -> BTreeSet<K> {
        std::mem::take(&mut self.touched)
    }

    pub fn len(&self) -> usize {
        self.ways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ways.is_empty()
    }
}
