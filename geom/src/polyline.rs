use geo::SimplifyIdx;

use crate::{Line, Pt2D};

/// Total length of the path, and the length of its shortest step. A path with fewer than two
/// points has neither.
pub fn pts_length(pts: &[Pt2D]) -> (f64, f64) {
    if pts.len() < 2 {
        return (0.0, 0.0);
    }
    let mut total = 0.0;
    let mut min = f64::MAX;
    for pair in pts.windows(2) {
        let dist = pair[0].dist_to(pair[1]);
        total += dist;
        min = min.min(dist);
    }
    (total, min)
}

/// Drops points equal to their predecessor.
pub fn dedupe_adjacent(pts: Vec<Pt2D>) -> Vec<Pt2D> {
    let mut result: Vec<Pt2D> = Vec::with_capacity(pts.len());
    for pt in pts {
        if result.last() != Some(&pt) {
            result.push(pt);
        }
    }
    result
}

/// Douglas-Peucker. Returns the indices of the points to keep, always including both ends.
pub fn simplify_idx(pts: &[Pt2D], epsilon: f64) -> Vec<usize> {
    if pts.len() <= 2 {
        return (0..pts.len()).collect();
    }
    let ls: geo::LineString<f64> = pts.iter().map(|pt| pt.to_coord()).collect();
    ls.simplify_idx(&epsilon)
}

/// A path is self-crossing if it crosses or touches itself anywhere other than where adjacent
/// steps meet. Closed loops are fine, and so are "P" shapes where one end touches the interior
/// of the path once.
pub fn is_self_crossing(pts: &[Pt2D]) -> bool {
    if pts.len() <= 2 {
        return false;
    }
    if is_simple(pts) {
        return false;
    }

    let first = pts[0];
    let last = pts[pts.len() - 1];
    let mut touching_end = None;
    for pt in &pts[1..pts.len() - 1] {
        if *pt == first {
            if touching_end.is_some() {
                return true;
            }
            touching_end = Some(true);
        } else if *pt == last {
            if touching_end.is_some() {
                return true;
            }
            touching_end = Some(false);
        }
    }
    match touching_end {
        None => true,
        Some(true) => !is_simple(&pts[1..]),
        Some(false) => !is_simple(&pts[..pts.len() - 1]),
    }
}

/// Splits a path into pieces that aren't self-crossing. Consecutive pieces share one point, so
/// concatenating them (dropping the repeated point) reproduces the input. Greedy and quadratic,
/// but only used on the rare bad cases.
pub fn split_self_crossing(pts: &[Pt2D]) -> Vec<Vec<Pt2D>> {
    let mut pieces = Vec::new();
    let mut rest = pts;
    while rest.len() > 1 {
        let mut len = rest.len();
        while len > 2 && is_self_crossing(&rest[..len]) {
            len -= 1;
        }
        pieces.push(rest[..len].to_vec());
        rest = &rest[len - 1..];
    }
    pieces
}

// Adjacent steps may only share their common point; a closed loop may also share its seam.
fn is_simple(pts: &[Pt2D]) -> bool {
    if pts.len() < 3 {
        return true;
    }
    let closed = pts[0] == pts[pts.len() - 1];
    let lines: Vec<Line> = pts
        .windows(2)
        .map(|pair| Line::new(pair[0], pair[1]))
        .collect();
    let last_idx = lines.len() - 1;
    for i in 0..lines.len() {
        for j in (i + 1)..lines.len() {
            if j == i + 1 {
                if doubles_back(lines[i].pt2(), lines[i].pt1(), lines[j].pt2()) {
                    return false;
                }
            } else if closed && i == 0 && j == last_idx {
                if doubles_back(pts[0], lines[0].pt2(), lines[j].pt1()) {
                    return false;
                }
            } else if lines[i].touches(&lines[j]) {
                return false;
            }
        }
    }
    true
}

// Two steps leaving `shared` towards `a` and `b` overlap if they're collinear and head the same
// way.
fn doubles_back(shared: Pt2D, a: Pt2D, b: Pt2D) -> bool {
    let (ax, ay) = (a.x() - shared.x(), a.y() - shared.y());
    let (bx, by) = (b.x() - shared.x(), b.y() - shared.y());
    ax * by - ay * bx == 0.0 && ax * bx + ay * by > 0.0
}
