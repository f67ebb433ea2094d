use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

/// A BTreeMap with set values, so the same key can hold many distinct values.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiMap<K, V>
where
    K: Ord + PartialEq + Clone,
    V: Ord + PartialEq + Clone,
{
    map: BTreeMap<K, BTreeSet<V>>,
    empty: BTreeSet<V>,
}

impl<K, V> MultiMap<K, V>
where
    K: Ord + PartialEq + Clone,
    V: Ord + PartialEq + Clone,
{
    pub fn new() -> MultiMap<K, V> {
        MultiMap {
            map: BTreeMap::new(),
            empty: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.map.entry(key).or_insert_with(BTreeSet::new).insert(value);
    }

    pub fn remove(&mut self, key: K, value: V) {
        if let Some(values) = self.map.get_mut(&key) {
            values.remove(&value);
            if values.is_empty() {
                self.map.remove(&key);
            }
        }
    }

    pub fn get(&self, key: K) -> &BTreeSet<V> {
        self.map.get(&key).unwrap_or(&self.empty)
    }

    pub fn set(&mut self, key: K, values: BTreeSet<V>) {
        if values.is_empty() {
            self.map.remove(&key);
        } else {
            self.map.insert(key, values);
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn raw_map(&self) -> &BTreeMap<K, BTreeSet<V>> {
        &self.map
    }

    pub fn consume(self) -> BTreeMap<K, BTreeSet<V>> {
        self.map
    }
}

impl<K, V> Default for MultiMap<K, V>
where
    K: Ord + PartialEq + Clone,
    V: Ord + PartialEq + Clone,
{
    fn default() -> Self {
        MultiMap::new()
    }
}

/// Counts occurrences of each key.
#[derive(Clone, Debug)]
pub struct Counter<T: Ord + PartialEq + Clone> {
    map: BTreeMap<T, usize>,
    sum: usize,
}

impl<T: Ord + PartialEq + Clone> Default for Counter<T> {
    fn default() -> Counter<T> {
        Counter::new()
    }
}

impl<T: Ord + PartialEq + Clone> Counter<T> {
    pub fn new() -> Counter<T> {
        Counter {
            map: BTreeMap::new(),
            sum: 0,
        }
    }

    pub fn add(&mut self, val: T, amount: usize) -> usize {
        let entry = self.map.entry(val).or_insert(0);
        *entry += amount;
        self.sum += amount;
        *entry
    }

    /// Returns the count after incrementing.
    pub fn inc(&mut self, val: T) -> usize {
        self.add(val, 1)
    }

    /// Missing keys count as 0.
    pub fn get(&self, val: T) -> usize {
        self.map.get(&val).cloned().unwrap_or(0)
    }

    /// Values with the highest count first. Ties keep key order.
    pub fn sorted_desc(&self) -> Vec<(&T, usize)> {
        self.map
            .iter()
            .map(|(k, v)| (k, *v))
            .sorted_by(|a, b| b.1.cmp(&a.1))
            .collect()
    }

    pub fn sum(&self) -> usize {
        self.sum
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn consume(self) -> BTreeMap<T, usize> {
        self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multimap_drops_empty_keys() {
        let mut mm: MultiMap<&str, usize> = MultiMap::new();
        mm.insert("a", 1);
        mm.insert("a", 2);
        mm.insert("b", 3);
        assert_eq!(mm.len(), 2);
        mm.remove("b", 3);
        assert_eq!(mm.len(), 1);
        assert!(mm.get("b").is_empty());
        assert_eq!(mm.get("a").len(), 2);
    }

    #[test]
    fn counter() {
        let mut c = Counter::new();
        assert_eq!(c.inc("x"), 1);
        assert_eq!(c.inc("x"), 2);
        c.inc("y");
        assert_eq!(c.get("x"), 2);
        assert_eq!(c.get("z"), 0);
        assert_eq!(c.sum(), 3);
        assert_eq!(c.sorted_desc()[0], (&"x", 2));
    }
}
