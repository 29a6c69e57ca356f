use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::AccountId;

/// Per-account amounts for one year, keyed by account id.
///
/// Lookups of an account that was never written return zero, so callers can
/// add flows without seeding every account first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger(BTreeMap<AccountId, f64>);

impl Ledger {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// A ledger holding an explicit zero for each id.
    pub fn zeroed<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        ids.into_iter().map(|id| (id.to_string(), 0.0)).collect()
    }

    pub fn get(&self, id: &str) -> f64 {
        self.0.get(id).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn add(&mut self, id: &str, amount: f64) {
        match self.0.get_mut(id) {
            Some(value) => *value += amount,
            None => {
                self.0.insert(id.to_string(), amount);
            }
        }
    }

    pub fn set(&mut self, id: &str, amount: f64) {
        match self.0.get_mut(id) {
            Some(value) => *value = amount,
            None => {
                self.0.insert(id.to_string(), amount);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(id, value)| (id.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn total_where(&self, mut include: impl FnMut(&str) -> bool) -> f64 {
        self.0
            .iter()
            .filter(|(id, _)| include(id.as_str()))
            .map(|(_, value)| *value)
            .sum()
    }

    /// Element-wise sum; ids present in either side appear in the result.
    pub fn merged(&self, other: &Ledger) -> Ledger {
        let mut out = self.clone();
        for (id, value) in other.iter() {
            out.add(id, value);
        }
        out
    }
}

impl FromIterator<(AccountId, f64)> for Ledger {
    fn from_iter<T: IntoIterator<Item = (AccountId, f64)>>(iter: T) -> Self {
        let mut ledger = Ledger::new();
        for (id, value) in iter {
            ledger.add(&id, value);
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ids_read_as_zero_and_add_accumulates() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.get("brokerage"), 0.0);

        ledger.add("brokerage", 100.0);
        ledger.add("brokerage", 25.0);
        ledger.add("roth", 10.0);

        assert_eq!(ledger.get("brokerage"), 125.0);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.total(), 135.0);
        assert_eq!(ledger.total_where(|id| id == "roth"), 10.0);
    }

    #[test]
    fn iteration_is_ordered_by_id_and_serializes_as_object() {
        let ledger: Ledger = [("b".to_string(), 2.0), ("a".to_string(), 1.0)]
            .into_iter()
            .collect();
        let ids: Vec<&str> = ledger.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let json = serde_json::to_string(&ledger).expect("serialize ledger");
        assert_eq!(json, r#"{"a":1.0,"b":2.0}"#);
    }

    #[test]
    fn merged_sums_overlapping_ids() {
        let mut left = Ledger::zeroed(["a", "b"]);
        left.set("a", 5.0);
        let mut right = Ledger::new();
        right.add("b", 3.0);
        right.add("c", 1.0);

        let merged = left.merged(&right);
        assert_eq!(merged.get("a"), 5.0);
        assert_eq!(merged.get("b"), 3.0);
        assert_eq!(merged.get("c"), 1.0);
    }
}
