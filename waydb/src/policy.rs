use abstutil::Tags;

use crate::Segment;

/// Everything that interprets tag values lives outside this crate. The core only compares tags
/// for equality and asks this collaborator to decide the rest.
pub trait TagPolicy {
    /// Fold `incoming` from layer `source` into `existing`. Called exactly once per overlapping
    /// span; whatever it leaves in `existing` is committed.
    fn merge(&mut self, existing: &mut Tags, incoming: &Tags, source: &str);

    /// Veto removing a short two-point stub at the start or end of an RLID.
    fn keep_end_stub(&self, _seg: &Segment) -> bool {
        false
    }

    /// May a segment with these tags have its direction flipped?
    fn may_reverse(&self, _tags: &Tags) -> bool {
        true
    }

    /// Adjust direction-dependent tags after a segment has been flipped.
    fn reverse_tags(&self, _tags: &mut Tags) {}

    /// Douglas-Peucker tolerance for a segment with these tags.
    fn simplify_epsilon(&self, _tags: &Tags) -> f64 {
        1.0
    }
}

impl<F: FnMut(&mut Tags, &Tags, &str)> TagPolicy for F {
    fn merge(&mut self, existing: &mut Tags, incoming: &Tags, source: &str) {
        self(existing, incoming, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_policies() {
        let mut calls = 0;
        let mut policy = |existing: &mut Tags, incoming: &Tags, _: &str| {
            calls += 1;
            for (k, v) in incoming.inner() {
                existing.insert(k.clone(), v.clone());
            }
        };
        let mut existing = Tags::empty();
        let incoming: Tags = vec![("maxspeed", "50")].into_iter().collect();
        policy.merge(&mut existing, &incoming, "speed layer");
        assert!(existing.is("maxspeed", "50"));
        assert!(policy.may_reverse(&existing));
        assert_eq!(policy.simplify_epsilon(&existing), 1.0);
        drop(policy);
        assert_eq!(calls, 1);
    }
}
