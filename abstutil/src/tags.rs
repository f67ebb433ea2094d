use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Convenience functions around a string->string map. Nothing here interprets the values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new(map: BTreeMap<String, String>) -> Tags {
        Tags(map)
    }

    pub fn empty() -> Tags {
        Tags(BTreeMap::new())
    }

    pub fn get(&self, k: &str) -> Option<&String> {
        self.0.get(k)
    }

    pub fn contains_key(&self, k: &str) -> bool {
        self.0.contains_key(k)
    }

    pub fn is(&self, k: &str, v: &str) -> bool {
        self.0.get(k) == Some(&v.to_string())
    }

    pub fn is_any(&self, k: &str, values: Vec<&str>) -> bool {
        if let Some(v) = self.0.get(k) {
            values.contains(&v.as_ref())
        } else {
            false
        }
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, k: K, v: V) {
        self.0.insert(k.into(), v.into());
    }

    pub fn remove(&mut self, k: &str) -> Option<String> {
        self.0.remove(k)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn inner(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    /// Keys whose values differ (or are missing on one side).
    pub fn diff(&self, other: &Tags) -> Vec<(String, String, String)> {
        let mut results = Vec::new();
        for (k, v1) in self.inner() {
            let v2 = other.get(k).cloned().unwrap_or_default();
            if v1 != &v2 {
                results.push((k.clone(), v1.clone(), v2));
            }
        }
        for (k, v2) in other.inner() {
            if !self.contains_key(k) {
                results.push((k.clone(), String::new(), v2.clone()));
            }
        }
        results
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tags(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (k, v)) in self.0.iter().enumerate() {
            if idx != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_diff() {
        let a: Tags = vec![("highway", "primary"), ("maxspeed", "50")]
            .into_iter()
            .collect();
        let mut b = a.clone();
        assert_eq!(a, b);
        b.insert("maxspeed", "70");
        b.insert("lit", "yes");
        assert_ne!(a, b);
        assert_eq!(
            a.diff(&b),
            vec![
                ("maxspeed".to_string(), "50".to_string(), "70".to_string()),
                ("lit".to_string(), String::new(), "yes".to_string()),
            ]
        );
        assert_eq!(a.to_string(), "{highway=primary, maxspeed=50}");
    }
}
