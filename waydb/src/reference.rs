use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context, Result};

use abstutil::Timer;
use geom::{dedupe_adjacent, HashablePt2D, Line, Pt2D};

use crate::{Config, Extent, GeometrySearch, RefWayId, Rlid, TwoDimSearch, Way, WayDatabase};

/// The fixpoint endpoint snapping pass gives up after this many rounds.
const MAX_SNAP_ROUNDS: usize = 10;
/// Extend-and-snap candidates this close to the extrapolated line are taken in the first pass.
const EXACT_EXTENSION_DEVIATION: f64 = 1e-5;

/// A piece of reference geometry being cleaned up before it's indexed.
#[derive(Clone, Debug)]
struct RawRef {
    rlid: Rlid,
    pts: Vec<Pt2D>,
    extent: Option<Extent>,
}

impl RawRef {
    fn first(&self) -> Pt2D {
        self.pts[0]
    }

    fn last(&self) -> Pt2D {
        self.pts[self.pts.len() - 1]
    }

    fn is_closed(&self) -> bool {
        self.first() == self.last()
    }
}

impl WayDatabase {
    /// Build the reference network. Endpoints that almost meet are snapped together, dangling
    /// ends that nearly hit something are extended onto it, and the pieces of each RLID are
    /// joined and cleaned up before being indexed with linear referencing.
    pub fn new(cfg: Config, reference: Vec<Way>, timer: &mut Timer) -> Result<WayDatabase> {
        cfg.validate()?;
        timer.start("set up reference geometry");

        let mut db = WayDatabase {
            ref_gs: GeometrySearch::new(cfg.max_segment_length, true, cfg.perform_self_testing),
            cfg,
            way_db: BTreeMap::new(),
            point_db: BTreeMap::new(),
            ref_way_db: BTreeMap::new(),
            next_ref_id: 0,
            merged: None,
            stats: Default::default(),
        };

        let mut raws = to_raw(reference, timer);
        let mut endpoints = index_endpoints(&raws);
        let (ep_count, mp_count) =
            snap_points_to_nearby_endpoints(&db.cfg, &mut raws, &mut endpoints)?;
        timer.note(format!(
            "Snapped {} endpoints and {} midpoints of the reference geometry",
            ep_count, mp_count
        ));
        extend_and_snap_unconnected(&db.cfg, &mut raws, &mut endpoints, timer)?;
        check_endpoint_clashes(&db.cfg, &raws)?;

        db.insert_into_reference_geometry(raws, &endpoints, timer)?;
        timer.note(format!(
            "{} pieces of reference geometry for {} RLIDs",
            db.ref_gs.len(),
            db.ref_way_db.len()
        ));
        timer.stop("set up reference geometry");
        Ok(db)
    }

    /// A layer may reference RLIDs the reference network lacks. Insert that layer's own geometry
    /// for them. Returns true if anything was added.
    pub fn insert_missing_reference_geometry(
        &mut self,
        ways: &[Way],
        timer: &mut Timer,
    ) -> Result<bool> {
        let missing: Vec<Way> = ways
            .iter()
            .filter(|w| !self.ref_way_db.contains_key(&w.rlid))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }
        let rlids: BTreeSet<Rlid> = missing.iter().map(|w| w.rlid.clone()).collect();
        for rlid in &rlids {
            timer.warn(format!(
                "RLID {} is missing from the reference geometry; using the layer's own geometry",
                rlid
            ));
        }

        let mut raws = to_raw(missing, timer);
        let mut endpoints = index_endpoints(&raws);
        snap_points_to_nearby_endpoints(&self.cfg, &mut raws, &mut endpoints)?;
        self.insert_into_reference_geometry(raws, &endpoints, timer)?;
        Ok(true)
    }

    fn insert_into_reference_geometry(
        &mut self,
        raws: Vec<RawRef>,
        endpoints: &TwoDimSearch<usize>,
        timer: &mut Timer,
    ) -> Result<()> {
        let mut by_rlid: BTreeMap<Rlid, Vec<RawRef>> = BTreeMap::new();
        for raw in raws {
            by_rlid
                .entry(raw.rlid.clone())
                .or_insert_with(Vec::new)
                .push(raw);
        }

        timer.start_iter("index reference geometry", by_rlid.len());
        for (rlid, mut pieces) in by_rlid {
            timer.next();
            for piece in &mut pieces {
                piece.pts = dedupe_adjacent(std::mem::take(&mut piece.pts));
            }
            pieces.retain(|p| p.pts.len() >= 2);
            if pieces.is_empty() {
                timer.warn(format!("RLID {} collapsed to a single point", rlid));
                continue;
            }
            if pieces.len() > 1 && pieces.iter().all(|p| p.extent.is_some()) {
                pieces = trim_overlaps(pieces, &self.cfg)?;
            }
            let pieces = join_ways(pieces);
            let pieces = join_gaps(pieces, endpoints, &self.cfg, timer);

            for piece in pieces {
                let pts = remove_short_segments_and_redundant_points(
                    &piece.pts,
                    self.cfg.point_snap_distance,
                    |pt| endpoints.contains(pt),
                )
                .with_context(|| format!("cleaning up reference geometry for RLID {}", rlid))?;
                if pts.len() < 2 {
                    timer.warn(format!("A piece of RLID {} is too short to keep", rlid));
                    continue;
                }
                warn_self_connections(&rlid, &pts, timer);

                let key = RefWayId(self.next_ref_id);
                self.next_ref_id += 1;
                self.ref_gs.insert(key, rlid.clone(), &pts)?;
                self.ref_gs.test_way_dist(key)?;
                self.ref_way_db
                    .entry(rlid.clone())
                    .or_insert_with(Vec::new)
                    .push(key);
            }
            self.cover_reference(&rlid)?;
        }
        Ok(())
    }
}

fn to_raw(ways: Vec<Way>, timer: &mut Timer) -> Vec<RawRef> {
    let mut raws = Vec::new();
    for way in ways {
        let pts = dedupe_adjacent(way.pts);
        if pts.len() < 2 {
            timer.warn(format!(
                "Skipping reference geometry for RLID {} with less than 2 distinct points",
                way.rlid
            ));
            continue;
        }
        raws.push(RawRef {
            rlid: way.rlid,
            pts,
            extent: way.extent,
        });
    }
    raws
}

fn index_endpoints(raws: &[RawRef]) -> TwoDimSearch<usize> {
    let mut endpoints = TwoDimSearch::new();
    for (idx, raw) in raws.iter().enumerate() {
        endpoints.insert(raw.first(), idx);
        endpoints.insert(raw.last(), idx);
    }
    endpoints
}

// Two passes: a very tight one, then one at point_snap_distance that repeats until nothing moves.
// The second pass prefers landing on points the first pass produced. Returns how many endpoints
// and midpoints moved. Midpoints that got connected join the endpoint index at the end.
fn snap_points_to_nearby_endpoints(
    cfg: &Config,
    raws: &mut [RawRef],
    endpoints: &mut TwoDimSearch<usize>,
) -> Result<(usize, usize)> {
    let mut ep_count = 0;
    let mut mp_count = 0;
    let mut connected_midpoints: BTreeSet<(usize, usize)> = BTreeSet::new();
    let mut snapped: BTreeSet<HashablePt2D> = BTreeSet::new();

    for (pass, snap_distance) in [cfg.tight_endpoint_snap_distance, cfg.point_snap_distance]
        .into_iter()
        .enumerate()
    {
        let first_pass = pass == 0;
        for round in 0..MAX_SNAP_ROUNDS {
            let mut changed = false;
            for w in 0..raws.len() {
                for idx in 0..raws[w].pts.len() {
                    let pt = raws[w].pts[idx];
                    let ep_list = endpoints.find_all_within_list(pt, snap_distance);
                    if ep_list.is_empty() {
                        continue;
                    }
                    let mut new_pt = ep_list[0].0;
                    if first_pass {
                        snapped.insert(new_pt.to_hashable());
                    } else if let Some((p, _)) = ep_list
                        .iter()
                        .find(|(p, _)| snapped.contains(&p.to_hashable()))
                    {
                        new_pt = *p;
                    }

                    for (old_pt, owners) in &ep_list {
                        if *old_pt == new_pt {
                            continue;
                        }
                        endpoints.remove_set(*old_pt)?;
                        for owner in owners {
                            let way = &mut raws[*owner];
                            let n = way.pts.len();
                            if way.pts[0] == *old_pt {
                                way.pts[0] = new_pt;
                            }
                            if way.pts[n - 1] == *old_pt {
                                way.pts[n - 1] = new_pt;
                            }
                            endpoints.insert(new_pt, *owner);
                            ep_count += 1;
                            changed = true;
                        }
                    }

                    let n = raws[w].pts.len();
                    if idx != 0 && idx != n - 1 {
                        connected_midpoints.insert((w, idx));
                    }
                    if raws[w].pts[idx] != new_pt {
                        raws[w].pts[idx] = new_pt;
                        mp_count += 1;
                        changed = true;
                    }
                }
            }
            if first_pass || !changed {
                break;
            }
            if round == MAX_SNAP_ROUNDS - 1 {
                warn!(
                    "Endpoint snapping still moving points after {} rounds",
                    MAX_SNAP_ROUNDS
                );
            }
        }
    }

    for (w, idx) in connected_midpoints {
        endpoints.insert(raws[w].pts[idx], w);
    }
    Ok((ep_count, mp_count))
}

// Dangling ends that almost reach an endpoint or midpoint ahead of them get moved onto it. Ends
// that line up exactly with their target go first, so they can't be stolen by sloppier ones.
fn extend_and_snap_unconnected(
    cfg: &Config,
    raws: &mut [RawRef],
    endpoints: &mut TwoDimSearch<usize>,
    timer: &mut Timer,
) -> Result<()> {
    let mut midpoints = TwoDimSearch::new();
    for (w, raw) in raws.iter().enumerate() {
        for pt in &raw.pts[1..raw.pts.len() - 1] {
            midpoints.insert(*pt, w);
        }
    }

    let is_connected = |endpoints: &TwoDimSearch<usize>, pt: Pt2D| {
        endpoints.get(pt).map(|owners| owners.len()).unwrap_or(0) > 1
    };

    let mut count = 0;
    let mut second_pass = BTreeSet::new();
    for w in 0..raws.len() {
        if raws[w].is_closed() {
            continue;
        }
        for is_start in [true, false] {
            let end = if is_start { raws[w].first() } else { raws[w].last() };
            if is_connected(endpoints, end) {
                continue;
            }
            match extend_and_snap(&raws[w].pts, is_start, endpoints, &midpoints, cfg) {
                None => {}
                Some((_, dev, _)) if dev > EXACT_EXTENSION_DEVIATION => {
                    second_pass.insert(w);
                }
                Some((ext_dist, dev, pt)) => {
                    move_end(&mut raws[w], w, is_start, pt, endpoints)?;
                    debug!(
                        "Extend-snapped RLID {} by {}m onto {} (deviation {})",
                        raws[w].rlid, ext_dist, pt, dev
                    );
                    count += 1;
                }
            }
        }
    }

    for w in second_pass {
        for is_start in [true, false] {
            let end = if is_start { raws[w].first() } else { raws[w].last() };
            if is_connected(endpoints, end) {
                continue;
            }
            if let Some((ext_dist, dev, pt)) =
                extend_and_snap(&raws[w].pts, is_start, endpoints, &midpoints, cfg)
            {
                move_end(&mut raws[w], w, is_start, pt, endpoints)?;
                debug!(
                    "Extend-snapped RLID {} by {}m onto {} (deviation {})",
                    raws[w].rlid, ext_dist, pt, dev
                );
                count += 1;
            }
        }
    }

    if count > 0 {
        timer.warn(format!(
            "Extended {} unconnected endpoints of the reference geometry to snap them",
            count
        ));
    }
    Ok(())
}

fn move_end(
    raw: &mut RawRef,
    w: usize,
    is_start: bool,
    pt: Pt2D,
    endpoints: &mut TwoDimSearch<usize>,
) -> Result<()> {
    let idx = if is_start { 0 } else { raw.pts.len() - 1 };
    endpoints.remove(raw.pts[idx], w)?;
    raw.pts[idx] = pt;
    endpoints.insert(pt, w);
    Ok(())
}

// Extrapolate the last step of a way past its end, and find the point within max_snap_distance
// that lies closest to that line. Returns the extension length, the deviation, and the point.
fn extend_and_snap(
    pts: &[Pt2D],
    is_start: bool,
    endpoints: &TwoDimSearch<usize>,
    midpoints: &TwoDimSearch<usize>,
    cfg: &Config,
) -> Option<(f64, f64, Pt2D)> {
    let (tip, base) = if is_start {
        let tip = pts[0];
        (tip, pts.iter().skip(1).find(|p| **p != tip).cloned()?)
    } else {
        let tip = pts[pts.len() - 1];
        (tip, pts.iter().rev().skip(1).find(|p| **p != tip).cloned()?)
    };

    let mut candidates = endpoints.find_all_within_list(tip, cfg.max_snap_distance);
    candidates.extend(midpoints.find_all_within_list(tip, cfg.max_snap_distance));

    let direction = Line::new(base, tip);
    let mut best_dev = cfg.point_snap_distance;
    let mut best = None;
    for (pt, _) in candidates {
        if pt == tip {
            continue;
        }
        let ext_dist = tip.dist_to(pt);
        if ext_dist >= cfg.max_snap_distance {
            continue;
        }
        let dev = direction.extend_past_end(ext_dist).dist_to(pt);
        // Behind the tip
        if dev > ext_dist {
            continue;
        }
        if dev >= best_dev {
            continue;
        }
        let s1 = dev / 2.0;
        let s2 = (base.dist_sq_to(pt) - s1 * s1).max(0.0).sqrt();
        if s1.atan2(s2).to_degrees() >= cfg.extend_snap_max_angle {
            continue;
        }
        best_dev = dev;
        best = Some((ext_dist, dev, pt));
    }
    best
}

// After snapping, distinct endpoints closer than point_snap_distance mean the geometry can't be
// trusted.
fn check_endpoint_clashes(cfg: &Config, raws: &[RawRef]) -> Result<()> {
    let endpoints = index_endpoints(raws);
    for raw in raws {
        for end in [raw.first(), raw.last()] {
            if let Some((dist, other, _)) =
                endpoints.find_nearest_within(end, cfg.point_snap_distance, true)
            {
                error!("RLID {}: {:?}", raw.rlid, raw.pts);
                bail!(
                    "Endpoints {} and {} (RLID {}) are only {}m apart after snapping",
                    end,
                    other,
                    raw.rlid,
                    dist
                );
            }
        }
    }
    Ok(())
}

fn merge_extents(a: Option<Extent>, b: Option<Extent>) -> Option<Extent> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Extent {
            start: a.start.min(b.start),
            end: a.end.max(b.end),
        }),
        _ => None,
    }
}

// Pieces of one RLID that overlap by extent: cut the earlier piece where it runs onto the later
// one. Pieces that touch by extent get glued together.
fn trim_overlaps(mut pieces: Vec<RawRef>, cfg: &Config) -> Result<Vec<RawRef>> {
    pieces.sort_by(|a, b| {
        let (a, b) = (extent_of(a), extent_of(b));
        a.start
            .total_cmp(&b.start)
            .then(a.end.total_cmp(&b.end))
    });

    let mut result = Vec::new();
    let mut iter = pieces.into_iter();
    let mut prev = match iter.next() {
        Some(p) => p,
        None => return Ok(result),
    };
    for mut piece in iter {
        let prev_end = extent_of(&prev).end;
        let start = extent_of(&piece).start;
        if prev_end < start {
            result.push(prev);
        } else if prev_end == start {
            let mut pts = prev.pts;
            pts.extend(piece.pts);
            piece.pts = dedupe_adjacent(pts);
            piece.extent = merge_extents(prev.extent, piece.extent);
        } else {
            debug!(
                "Pieces of RLID {} overlap from {} to {}",
                piece.rlid, start, prev_end
            );
            let mut gs = GeometrySearch::new(10.0, false, false);
            gs.insert(0usize, piece.rlid.clone(), &piece.pts)?;
            let mut pts = Vec::new();
            for pt in &prev.pts {
                if gs
                    .snap_point_into_geometry(
                        *pt,
                        cfg.point_snap_distance,
                        cfg.point_snap_distance,
                    )?
                    .is_some()
                {
                    break;
                }
                pts.push(*pt);
            }
            pts.extend(piece.pts);
            piece.pts = dedupe_adjacent(pts);
            piece.extent = merge_extents(prev.extent, piece.extent);
        }
        prev = piece;
    }
    result.push(prev);
    Ok(result)
}

fn extent_of(raw: &RawRef) -> Extent {
    raw.extent.unwrap_or(Extent {
        start: 0.0,
        end: 0.0,
    })
}

// Join pieces of one RLID that share an endpoint, end to start.
fn join_ways(mut pieces: Vec<RawRef>) -> Vec<RawRef> {
    if pieces.len() <= 1 {
        return pieces;
    }
    let mut result = Vec::new();
    let mut current = pieces.remove(0);
    loop {
        let found = if current.is_closed() {
            None
        } else {
            pieces
                .iter()
                .position(|w| current.last() == w.first() || current.first() == w.last())
        };
        match found {
            Some(idx) => {
                let other = pieces.remove(idx);
                if current.last() == other.first() {
                    current.pts.extend(&other.pts[1..]);
                } else {
                    let mut pts = other.pts.clone();
                    pts.pop();
                    pts.extend(current.pts);
                    current.pts = pts;
                }
                current.extent = merge_extents(current.extent, other.extent);
            }
            None => {
                result.push(current);
                if pieces.is_empty() {
                    break;
                }
                current = pieces.remove(0);
            }
        }
    }
    result
}

// Pieces of the same RLID separated by a tiny gap get joined. The endpoint that's connected to
// more of the network survives.
fn join_gaps(
    mut pieces: Vec<RawRef>,
    endpoints: &TwoDimSearch<usize>,
    cfg: &Config,
    timer: &mut Timer,
) -> Vec<RawRef> {
    if pieces.len() <= 1 {
        return pieces;
    }
    if pieces.iter().all(|p| p.extent.is_some()) {
        pieces.sort_by(|a, b| extent_of(a).start.total_cmp(&extent_of(b).start));
    }

    'outer: loop {
        for i in 0..pieces.len() {
            for j in 0..pieces.len() {
                if i == j || pieces[i].is_closed() || pieces[j].is_closed() {
                    continue;
                }
                let gap = pieces[i].last().dist_to(pieces[j].first());
                if gap >= cfg.gap_join_distance {
                    continue;
                }
                timer.warn(format!(
                    "RLID {} has a {:.3}m gap at {}; joining the pieces",
                    pieces[i].rlid,
                    gap,
                    pieces[i].last()
                ));
                let r1 = endpoints
                    .find_all_within(pieces[j].first(), cfg.point_snap_distance)
                    .len();
                let r2 = endpoints
                    .find_all_within(pieces[i].last(), cfg.point_snap_distance)
                    .len();
                let (a, b) = (&pieces[i], &pieces[j]);
                let pts: Vec<Pt2D> = if r1 > r2 {
                    a.pts[..a.pts.len() - 1]
                        .iter()
                        .chain(b.pts.iter())
                        .cloned()
                        .collect()
                } else {
                    a.pts.iter().chain(b.pts[1..].iter()).cloned().collect()
                };
                let joined = RawRef {
                    rlid: a.rlid.clone(),
                    pts,
                    extent: merge_extents(a.extent, b.extent),
                };
                pieces.remove(i.max(j));
                pieces.remove(i.min(j));
                pieces.insert(i.min(j), joined);
                continue 'outer;
            }
        }
        break;
    }
    pieces
}

/// Drop redundant and too-closely spaced points, never removing the ends or a point `keep`
/// says is important. Two points closer than `min_seg_len` where both must be kept is an error.
pub(crate) fn remove_short_segments_and_redundant_points<F: Fn(Pt2D) -> bool>(
    pts: &[Pt2D],
    min_seg_len: f64,
    keep: F,
) -> Result<Vec<Pt2D>> {
    let mut result: Vec<Pt2D> = Vec::new();
    for (idx, pt) in pts.iter().enumerate() {
        let pt = *pt;
        let last_idx = pts.len() - 1;
        let prev = match result.last() {
            Some(prev) => *prev,
            None => {
                result.push(pt);
                continue;
            }
        };
        if pt == prev {
            continue;
        }
        if prev.dist_to(pt) >= min_seg_len {
            result.push(pt);
            continue;
        }

        // Too close to the previous kept point. The ends and keepers win over anything else.
        let pt_important = idx == last_idx || keep(pt);
        let prev_important = result.len() == 1 || keep(prev);
        match (pt_important, prev_important) {
            (true, true) => {
                if idx == last_idx && result.len() == 1 {
                    // The whole way is shorter than min_seg_len; keep both ends
                    result.push(pt);
                    continue;
                }
                bail!(
                    "Two points {} and {} that must be kept are only {}m apart",
                    prev,
                    pt,
                    prev.dist_to(pt)
                );
            }
            (true, false) => {
                result.pop();
                if result.last().map(|p| p.dist_to(pt) > 0.0).unwrap_or(true) {
                    result.push(pt);
                }
            }
            (false, _) => {}
        }
    }
    Ok(result)
}

fn warn_self_connections(rlid: &Rlid, pts: &[Pt2D], timer: &mut Timer) {
    let mut seen = BTreeSet::new();
    for (idx, pt) in pts.iter().enumerate() {
        let closes_loop = idx == pts.len() - 1 && *pt == pts[0];
        if !seen.insert(pt.to_hashable()) && !closes_loop {
            timer.warn(format!("RLID {} connects to itself at {}", rlid, pt));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use abstutil::Tags;

    fn pts(raw: Vec<(f64, f64)>) -> Vec<Pt2D> {
        raw.into_iter().map(|(x, y)| Pt2D::new(x, y)).collect()
    }

    fn way(rlid: &str, raw: Vec<(f64, f64)>) -> Way {
        Way::new(rlid, pts(raw), Tags::empty())
    }

    #[test]
    fn redundant_points() {
        let cleaned = remove_short_segments_and_redundant_points(
            &pts(vec![(0.0, 0.0), (0.0, 0.0), (5.0, 0.0), (5.05, 0.0), (10.0, 0.0)]),
            0.1,
            |_| false,
        )
        .unwrap();
        assert_eq!(cleaned, pts(vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0)]));

        // The last point replaces a close interior one
        let cleaned = remove_short_segments_and_redundant_points(
            &pts(vec![(0.0, 0.0), (5.0, 0.0), (5.05, 0.0)]),
            0.1,
            |_| false,
        )
        .unwrap();
        assert_eq!(cleaned, pts(vec![(0.0, 0.0), (5.05, 0.0)]));

        // A tiny way keeps both ends
        let cleaned = remove_short_segments_and_redundant_points(
            &pts(vec![(0.0, 0.0), (0.05, 0.0)]),
            0.1,
            |_| false,
        )
        .unwrap();
        assert_eq!(cleaned.len(), 2);

        let keepers = pts(vec![(5.0, 0.0), (5.05, 0.0)]);
        assert!(remove_short_segments_and_redundant_points(
            &pts(vec![(0.0, 0.0), (5.0, 0.0), (5.05, 0.0), (10.0, 0.0)]),
            0.1,
            |pt| keepers.contains(&pt),
        )
        .is_err());
    }

    #[test]
    fn nearby_endpoints_get_snapped() {
        let mut timer = Timer::throwaway();
        let db = WayDatabase::new(
            Config::default(),
            vec![
                way("A", vec![(0.0, 0.0), (10.0, 0.0)]),
                way("B", vec![(10.05, 0.0), (10.05, 10.0)]),
            ],
            &mut timer,
        )
        .unwrap();
        let a = db.ref_gs.way_coords(db.reference_ways(&"A".into())[0]);
        let b = db.ref_gs.way_coords(db.reference_ways(&"B".into())[0]);
        assert_eq!(a[1], b[0]);
    }

    #[test]
    fn dangling_end_is_extended_onto_a_midpoint() {
        let mut timer = Timer::throwaway();
        let db = WayDatabase::new(
            Config::default(),
            vec![
                way("A", vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]),
                way("B", vec![(10.0, 10.0), (10.0, 1.0)]),
            ],
            &mut timer,
        )
        .unwrap();
        let b = db.ref_gs.way_coords(db.reference_ways(&"B".into())[0]);
        assert_eq!(b[1], Pt2D::new(10.0, 0.0));
        assert!(!timer.warnings().is_empty());
    }

    #[test]
    fn pieces_of_one_rlid_are_joined() {
        let mut timer = Timer::throwaway();
        let db = WayDatabase::new(
            Config::default(),
            vec![
                way("A", vec![(10.0, 0.0), (20.0, 0.0)]),
                way("A", vec![(0.0, 0.0), (10.0, 0.0)]),
            ],
            &mut timer,
        )
        .unwrap();
        let keys = db.reference_ways(&"A".into());
        assert_eq!(keys.len(), 1);
        assert_eq!(
            db.ref_gs.way_coords(keys[0]),
            pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)])
        );
    }

    #[test]
    fn small_gaps_are_closed() {
        let mut timer = Timer::throwaway();
        let db = WayDatabase::new(
            Config::default(),
            vec![
                way("A", vec![(0.0, 0.0), (10.0, 0.0)]),
                // Offset sideways, so extend-and-snap won't close it first
                way("A", vec![(10.5, 0.3), (20.0, 0.3)]),
            ],
            &mut timer,
        )
        .unwrap();
        let keys = db.reference_ways(&"A".into());
        assert_eq!(keys.len(), 1);
        assert_eq!(
            db.ref_gs.way_coords(keys[0]),
            pts(vec![(0.0, 0.0), (10.0, 0.0), (20.0, 0.3)])
        );
        assert!(timer.warnings().iter().any(|w| w.contains("gap")));
    }

    #[test]
    fn overlapping_pieces_are_trimmed() {
        let mut timer = Timer::throwaway();
        let db = WayDatabase::new(
            Config::default(),
            vec![
                way("A", vec![(0.0, 0.0), (10.0, 0.0), (15.0, 0.0)]).with_extent(0.0, 0.6),
                way("A", vec![(12.0, 0.0), (20.0, 0.0)]).with_extent(0.5, 1.0),
            ],
            &mut timer,
        )
        .unwrap();
        let keys = db.reference_ways(&"A".into());
        assert_eq!(keys.len(), 1);
        assert_eq!(
            db.ref_gs.way_coords(keys[0]),
            pts(vec![(0.0, 0.0), (10.0, 0.0), (12.0, 0.0), (20.0, 0.0)])
        );
    }

    #[test]
    fn separate_pieces_get_distinct_dist_ranges() {
        let mut timer = Timer::throwaway();
        let db = WayDatabase::new(
            Config::default(),
            vec![
                way("A", vec![(0.0, 0.0), (10.5, 0.0)]),
                way("A", vec![(100.0, 0.0), (110.0, 0.0)]),
            ],
            &mut timer,
        )
        .unwrap();
        let keys = db.reference_ways(&"A".into());
        assert_eq!(keys.len(), 2);
        let second = db.ref_gs.way_pts(keys[1])[0];
        assert_eq!(db.dist(second).unwrap(), 12.0);
    }

    #[test]
    fn missing_reference_geometry() {
        let mut timer = Timer::throwaway();
        let mut db = WayDatabase::new(
            Config::default(),
            vec![way("A", vec![(0.0, 0.0), (10.0, 0.0)])],
            &mut timer,
        )
        .unwrap();
        let layer = vec![
            way("A", vec![(0.0, 0.0), (10.0, 0.0)]),
            way("B", vec![(0.0, 5.0), (10.0, 5.0)]),
        ];
        assert!(db
            .insert_missing_reference_geometry(&layer, &mut timer)
            .unwrap());
        assert_eq!(db.reference_ways(&"B".into()).len(), 1);
        assert!(!db
            .insert_missing_reference_geometry(&layer, &mut timer)
            .unwrap());
        assert_eq!(db.get_reference_geometry().len(), 2);
    }
}
