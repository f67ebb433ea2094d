use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Result};
use ordered_float::OrderedFloat;

use geom::Pt2D;

/// Maps exact coordinates to the set of owners registered there. Points are bucketed by x, then
/// by y, so a query only scans the x-range and then the y-range around it. Query radii are small
/// compared to the whole dataset, so this stays fast without a tree.
#[derive(Clone, Debug)]
pub struct TwoDimSearch<K: Copy + Ord> {
    xmap: BTreeMap<OrderedFloat<f64>, BTreeMap<OrderedFloat<f64>, BTreeSet<K>>>,
    len: usize,
}

impl<K: Copy + Ord> TwoDimSearch<K> {
    pub fn new() -> TwoDimSearch<K> {
        TwoDimSearch {
            xmap: BTreeMap::new(),
            len: 0,
        }
    }

    /// Number of distinct coordinates.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, pt: Pt2D, owner: K) {
        let ymap = self.xmap.entry(OrderedFloat(pt.x())).or_default();
        let owners = ymap.entry(OrderedFloat(pt.y())).or_insert_with(|| {
            self.len += 1;
            BTreeSet::new()
        });
        owners.insert(owner);
    }

    /// Removing something that isn't there is a caller bug, so it's an error.
    pub fn remove(&mut self, pt: Pt2D, owner: K) -> Result<()> {
        let x = OrderedFloat(pt.x());
        let y = OrderedFloat(pt.y());
        let ymap = match self.xmap.get_mut(&x) {
            Some(ymap) => ymap,
            None => bail!("{} isn't in the index", pt),
        };
        let owners = match ymap.get_mut(&y) {
            Some(owners) => owners,
            None => bail!("{} isn't in the index", pt),
        };
        if !owners.remove(&owner) {
            bail!("{} is in the index, but not for this owner", pt);
        }
        if owners.is_empty() {
            ymap.remove(&y);
            self.len -= 1;
            if ymap.is_empty() {
                self.xmap.remove(&x);
            }
        }
        Ok(())
    }

    /// Drops a coordinate and every owner registered there.
    pub fn remove_set(&mut self, pt: Pt2D) -> Result<()> {
        let x = OrderedFloat(pt.x());
        if let Some(ymap) = self.xmap.get_mut(&x) {
            if ymap.remove(&OrderedFloat(pt.y())).is_some() {
                self.len -= 1;
                if ymap.is_empty() {
                    self.xmap.remove(&x);
                }
                return Ok(());
            }
        }
        bail!("{} isn't in the index", pt)
    }

    /// Removes an owner from every coordinate. Scans everything, so it's slow.
    pub fn remove_owner(&mut self, owner: K) {
        let mut removed = 0;
        self.xmap.retain(|_, ymap| {
            ymap.retain(|_, owners| {
                owners.remove(&owner);
                if owners.is_empty() {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            !ymap.is_empty()
        });
        self.len -= removed;
    }

    pub fn contains(&self, pt: Pt2D) -> bool {
        self.get(pt).is_some()
    }

    pub fn get(&self, pt: Pt2D) -> Option<&BTreeSet<K>> {
        self.xmap
            .get(&OrderedFloat(pt.x()))
            .and_then(|ymap| ymap.get(&OrderedFloat(pt.y())))
    }

    /// The closest indexed coordinate within `radius`, its distance, and its owners. With
    /// `exclude_self`, the query coordinate itself is skipped.
    pub fn find_nearest_within(
        &self,
        pt: Pt2D,
        radius: f64,
        exclude_self: bool,
    ) -> Option<(f64, Pt2D, &BTreeSet<K>)> {
        let radius_sq = radius * radius;
        let mut best: Option<(f64, Pt2D, &BTreeSet<K>)> = None;
        for (x, y, owners) in self.scan_box(pt, radius) {
            if exclude_self && x == pt.x() && y == pt.y() {
                continue;
            }
            let candidate = Pt2D::new(x, y);
            let dist_sq = pt.dist_sq_to(candidate);
            if dist_sq > radius_sq {
                continue;
            }
            if best.as_ref().map(|(d, _, _)| dist_sq < *d).unwrap_or(true) {
                best = Some((dist_sq, candidate, owners));
            }
        }
        best.map(|(dist_sq, candidate, owners)| (dist_sq.sqrt(), candidate, owners))
    }

    /// Every owner with a coordinate inside the square of half-width `radius` around `pt`.
    pub fn find_all_within(&self, pt: Pt2D, radius: f64) -> BTreeSet<K> {
        let mut result = BTreeSet::new();
        for (_, _, owners) in self.scan_box(pt, radius) {
            result.extend(owners.iter().cloned());
        }
        result
    }

    /// Like `find_all_within`, but grouped by the exact coordinate each owner set lives at.
    pub fn find_all_within_list(&self, pt: Pt2D, radius: f64) -> Vec<(Pt2D, BTreeSet<K>)> {
        self.scan_box(pt, radius)
            .map(|(x, y, owners)| (Pt2D::new(x, y), owners.clone()))
            .collect()
    }

    /// Every indexed coordinate and its owners, sorted by x, then y.
    pub fn iter(&self) -> impl Iterator<Item = (Pt2D, &BTreeSet<K>)> {
        self.xmap.iter().flat_map(|(x, ymap)| {
            ymap.iter()
                .map(move |(y, owners)| (Pt2D::new(x.0, y.0), owners))
        })
    }

    fn scan_box(&self, pt: Pt2D, radius: f64) -> impl Iterator<Item = (f64, f64, &BTreeSet<K>)> {
        let y1 = OrderedFloat(pt.y() - radius);
        let y2 = OrderedFloat(pt.y() + radius);
        self.xmap
            .range(OrderedFloat(pt.x() - radius)..=OrderedFloat(pt.x() + radius))
            .flat_map(move |(x, ymap)| {
                ymap.range(y1..=y2)
                    .map(move |(y, owners)| (x.0, y.0, owners))
            })
    }
}

impl<K: Copy + Ord> Default for TwoDimSearch<K> {
    fn default() -> Self {
        TwoDimSearch::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(x: f64, y: f64) -> Pt2D {
        Pt2D::new(x, y)
    }

    #[test]
    fn insert_and_remove() {
        let mut idx = TwoDimSearch::new();
        idx.insert(pt(0.0, 0.0), 1);
        idx.insert(pt(0.0, 0.0), 2);
        idx.insert(pt(1.0, 0.0), 1);
        assert_eq!(idx.len(), 2);

        idx.remove(pt(0.0, 0.0), 1).unwrap();
        assert_eq!(idx.len(), 2);
        idx.remove(pt(0.0, 0.0), 2).unwrap();
        assert_eq!(idx.len(), 1);
        assert!(!idx.contains(pt(0.0, 0.0)));

        // Missing points and missing owners are both errors
        assert!(idx.remove(pt(0.0, 0.0), 2).is_err());
        assert!(idx.remove(pt(1.0, 0.0), 7).is_err());
        assert!(idx.remove_set(pt(5.0, 5.0)).is_err());
        idx.remove_set(pt(1.0, 0.0)).unwrap();
        assert!(idx.is_empty());
    }

    #[test]
    fn remove_owner_everywhere() {
        let mut idx = TwoDimSearch::new();
        idx.insert(pt(0.0, 0.0), 1);
        idx.insert(pt(1.0, 0.0), 1);
        idx.insert(pt(1.0, 0.0), 2);
        idx.remove_owner(1);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get(pt(1.0, 0.0)).unwrap().len(), 1);
    }

    #[test]
    fn nearest() {
        let mut idx = TwoDimSearch::new();
        idx.insert(pt(0.0, 0.0), 1);
        idx.insert(pt(3.0, 0.0), 2);
        idx.insert(pt(1.0, 1.0), 3);

        let (dist, found, owners) = idx.find_nearest_within(pt(0.1, 0.0), 2.0, false).unwrap();
        assert!((dist - 0.1).abs() < 1e-9);
        assert_eq!(found, pt(0.0, 0.0));
        assert!(owners.contains(&1));

        // Inside the square, but outside the circle
        assert!(idx.find_nearest_within(pt(2.0, 2.0), 1.1, false).is_none());

        let (_, found, _) = idx.find_nearest_within(pt(0.0, 0.0), 5.0, true).unwrap();
        assert_eq!(found, pt(1.0, 1.0));
        assert!(TwoDimSearch::<usize>::new()
            .find_nearest_within(pt(0.0, 0.0), 1.0, false)
            .is_none());
    }

    #[test]
    fn all_within() {
        let mut idx = TwoDimSearch::new();
        idx.insert(pt(0.0, 0.0), 1);
        idx.insert(pt(0.5, 0.5), 2);
        idx.insert(pt(0.5, 0.5), 3);
        idx.insert(pt(5.0, 5.0), 4);
        assert_eq!(
            idx.find_all_within(pt(0.0, 0.0), 1.0),
            vec![1, 2, 3].into_iter().collect()
        );
        let list = idx.find_all_within_list(pt(0.0, 0.0), 1.0);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].0, pt(0.5, 0.5));
        assert_eq!(list[1].1.len(), 2);
        assert_eq!(idx.iter().count(), 3);
    }
}
