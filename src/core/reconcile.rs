//! Determines which freshly-listed identifiers still need a detail fetch.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Natural key of an upstream record, carried verbatim. Escaping happens at
/// URL-construction time, never here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Pending work for this run: everything listed upstream that the store does
/// not already know. Pure set difference: no I/O, no ordering guarantee,
/// same inputs always give the same output.
pub fn reconcile(listed: &HashSet<RecordId>, known: &HashSet<RecordId>) -> HashSet<RecordId> {
    listed.difference(known).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> HashSet<RecordId> {
        raw.iter().map(|s| RecordId::from(*s)).collect()
    }

    #[test]
    fn pending_is_listed_minus_known() {
        let listed = ids(&["T1", "T2", "T3"]);
        let known = ids(&["T2", "T4"]);
        assert_eq!(reconcile(&listed, &known), ids(&["T1", "T3"]));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let listed = ids(&["A", "B", "C", "D"]);
        let known = ids(&["B", "D"]);
        let first = reconcile(&listed, &known);
        let second = reconcile(&listed, &known);
        assert_eq!(first, second);
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let forward: HashSet<RecordId> = ["T1", "T2", "T3"].iter().map(|s| (*s).into()).collect();
        let reverse: HashSet<RecordId> = ["T3", "T2", "T1"].iter().map(|s| (*s).into()).collect();
        let known = ids(&["T2"]);
        assert_eq!(reconcile(&forward, &known), reconcile(&reverse, &known));
    }

    #[test]
    fn disjoint_and_empty_inputs() {
        let listed = ids(&["X", "Y"]);
        assert_eq!(reconcile(&listed, &HashSet::new()), listed);
        assert_eq!(reconcile(&HashSet::new(), &listed), HashSet::new());
        // Fully known: nothing pending.
        assert_eq!(reconcile(&listed, &listed), HashSet::new());
    }
}
