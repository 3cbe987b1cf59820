//! Per-edge connection security policy rates

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Connection security policy label reported for mutual TLS traffic
pub const POLICY_MTLS: &str = "mutual_tls";

/// Rates observed for one (source, dest) pair, keyed by security policy label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyRates {
    rates: BTreeMap<String, f64>,
}

impl PolicyRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a rate for a policy. A later observation replaces an earlier one.
    pub fn set(&mut self, policy: impl Into<String>, rate: f64) {
        self.rates.insert(policy.into(), rate);
    }

    pub fn get(&self, policy: &str) -> Option<f64> {
        self.rates.get(policy).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Percentage of traffic sent with mutual TLS.
    ///
    /// Returns `None` when the total rate is zero; the share is undefined then.
    pub fn mtls_percentage(&self) -> Option<f64> {
        let (mtls, other) = self.iter().fold((0.0, 0.0), |(mtls, other), (policy, rate)| {
            if policy == POLICY_MTLS {
                (mtls + rate, other)
            } else {
                (mtls, other + rate)
            }
        });

        let total = mtls + other;
        if total > 0.0 && total.is_finite() {
            Some(mtls / total * 100.0)
        } else {
            None
        }
    }
}

/// Directed (source node ID, dest node ID) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: String,
    pub dest: String,
}

impl EdgeKey {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source, self.dest)
    }
}

/// Policy rates for every observed pair; built per appender invocation
#[derive(Debug, Default)]
pub struct PolicyAggregator {
    rates: HashMap<EdgeKey, PolicyRates>,
}

impl PolicyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation, overwriting any prior rate for the same pair and policy
    pub fn add(&mut self, key: EdgeKey, policy: &str, rate: f64) {
        self.rates.entry(key).or_default().set(policy, rate);
    }

    pub fn get(&self, key: &EdgeKey) -> Option<&PolicyRates> {
        self.rates.get(key)
    }

    pub fn contains(&self, key: &EdgeKey) -> bool {
        self.rates.contains_key(key)
    }

    /// Observed pairs, sorted
    pub fn keys(&self) -> Vec<&EdgeKey> {
        let mut keys: Vec<&EdgeKey> = self.rates.keys().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mtls_percentage() {
        let mut rates = PolicyRates::new();
        rates.set(POLICY_MTLS, 8.0);
        rates.set("none", 2.0);
        assert!((rates.mtls_percentage().unwrap() - 80.0).abs() < 1e-9);

        let mut rates = PolicyRates::new();
        rates.set(POLICY_MTLS, 5.0);
        assert_eq!(rates.mtls_percentage(), Some(100.0));

        let mut rates = PolicyRates::new();
        rates.set("none", 3.0);
        rates.set("permissive", 1.0);
        assert_eq!(rates.mtls_percentage(), Some(0.0));
    }

    #[test]
    fn test_mtls_percentage_zero_total() {
        let mut rates = PolicyRates::new();
        rates.set(POLICY_MTLS, 0.0);
        rates.set("none", 0.0);
        assert_eq!(rates.mtls_percentage(), None);
        assert_eq!(PolicyRates::new().mtls_percentage(), None);
    }

    #[test]
    fn test_later_observation_overwrites() {
        let mut aggregator = PolicyAggregator::new();
        let key = EdgeKey::new("wl_a_x", "wl_b_y");

        aggregator.add(key.clone(), POLICY_MTLS, 2.0);
        aggregator.add(key.clone(), POLICY_MTLS, 7.0);
        aggregator.add(key.clone(), "none", 1.0);

        let rates = aggregator.get(&key).unwrap();
        assert_eq!(rates.get(POLICY_MTLS), Some(7.0));
        assert_eq!(rates.get("none"), Some(1.0));
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_edge_key_display() {
        assert_eq!(EdgeKey::new("wl_a_x", "svc_b_y").to_string(), "wl_a_x svc_b_y");
    }
}
