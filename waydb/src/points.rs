use std::fmt;

use anyhow::{anyhow, Result};

use geom::Pt2D;

/// A stable handle to one vertex record in a `PointArena`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointId(usize);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PointId({})", self.0)
    }
}

#[derive(Clone, Debug)]
struct NetworkPoint {
    pt: Pt2D,
    // Cumulative distance along the owning way; unset until the way is indexed with linear
    // referencing.
    dist: Option<f64>,
}

/// Every vertex of every indexed way lives here exactly once. Ways and segments hold
/// `PointId`s, so changing a record's `dist` is immediately visible to all of them.
#[derive(Clone, Debug, Default)]
pub struct PointArena {
    points: Vec<NetworkPoint>,
}

impl PointArena {
    pub fn new() -> PointArena {
        PointArena { points: Vec::new() }
    }

    pub fn add(&mut self, pt: Pt2D, dist: Option<f64>) -> PointId {
        self.points.push(NetworkPoint { pt, dist });
        PointId(self.points.len() - 1)
    }

    pub fn pt(&self, id: PointId) -> Pt2D {
        self.points[id.0].pt
    }

    pub fn dist(&self, id: PointId) -> Option<f64> {
        self.points[id.0].dist
    }

    /// Like `dist`, but for callers that require linear referencing to be set up.
    pub fn tracked_dist(&self, id: PointId) -> Result<f64> {
        self.dist(id)
            .ok_or_else(|| anyhow!("{} at {} has no dist", id, self.pt(id)))
    }

    pub fn set_dist(&mut self, id: PointId, dist: Option<f64>) {
        self.points[id.0].dist = dist;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_updates() {
        let mut arena = PointArena::new();
        let a = arena.add(Pt2D::new(1.0, 2.0), None);
        let b = arena.add(Pt2D::new(1.0, 2.0), Some(3.0));
        assert_ne!(a, b);
        assert!(arena.tracked_dist(a).is_err());

        let held_by_way = vec![a, b];
        let held_by_segment = vec![a];
        arena.set_dist(a, Some(7.5));
        assert_eq!(arena.dist(held_by_way[0]), Some(7.5));
        assert_eq!(arena.dist(held_by_segment[0]), Some(7.5));
        assert_eq!(arena.len(), 2);
    }
}
