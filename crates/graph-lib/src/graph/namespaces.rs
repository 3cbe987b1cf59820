//! Namespace window parameters and control-plane exclusion

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Default query window for a namespace
pub const DEFAULT_DURATION: Duration = Duration::from_secs(600);

/// Per-namespace configuration known to a graph build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    /// Range of the rate queries issued for this namespace
    pub duration: Duration,
    /// Whether this namespace hosts mesh control-plane/infrastructure workloads
    pub is_istio: bool,
}

impl NamespaceInfo {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            is_istio: false,
        }
    }

    /// A control-plane namespace
    pub fn istio(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            is_istio: true,
            ..Self::new(name, duration)
        }
    }
}

/// Namespace name -> info, ordered for deterministic iteration
pub type NamespaceInfoMap = BTreeMap<String, NamespaceInfo>;

/// Build a namespace map from requested namespaces and control-plane namespaces.
///
/// A namespace listed in both keeps its control-plane flag.
pub fn namespace_info_map(
    requested: &[String],
    istio_namespaces: &[String],
    duration: Duration,
) -> NamespaceInfoMap {
    let mut map = NamespaceInfoMap::new();
    for name in requested {
        map.insert(name.clone(), NamespaceInfo::new(name.clone(), duration));
    }
    for name in istio_namespaces {
        map.entry(name.clone())
            .and_modify(|info| info.is_istio = true)
            .or_insert_with(|| NamespaceInfo::istio(name.clone(), duration));
    }
    map
}

/// Control-plane namespaces to leave out of "traffic leaving this namespace"
/// queries. A control-plane namespace that was itself requested is part of the
/// graph and is not excluded.
pub fn istio_system_namespaces(
    namespaces: &NamespaceInfoMap,
    requested: &BTreeSet<String>,
) -> BTreeSet<String> {
    namespaces
        .values()
        .filter(|info| info.is_istio && !requested.contains(&info.name))
        .map(|info| info.name.clone())
        .collect()
}

/// Label matcher excluding the given destination service namespaces, or an
/// empty string when there is nothing to exclude
pub fn exclusion_clause(excluded: &BTreeSet<String>) -> String {
    if excluded.is_empty() {
        return String::new();
    }
    let regex = excluded
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("|");
    format!(r#",destination_service_namespace!~"{}""#, regex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_istio_namespaces_excluded_unless_requested() {
        let map = namespace_info_map(
            &names(&["bookinfo"]),
            &names(&["istio-system", "istio-ingress"]),
            DEFAULT_DURATION,
        );
        let requested: BTreeSet<String> = ["bookinfo".to_string()].into();

        let excluded = istio_system_namespaces(&map, &requested);
        assert_eq!(
            excluded.into_iter().collect::<Vec<_>>(),
            names(&["istio-ingress", "istio-system"])
        );
    }

    #[test]
    fn test_requested_istio_namespace_not_excluded() {
        let map = namespace_info_map(
            &names(&["bookinfo", "istio-system"]),
            &names(&["istio-system"]),
            DEFAULT_DURATION,
        );
        assert!(map["istio-system"].is_istio);

        let requested: BTreeSet<String> = map
            .values()
            .filter(|i| !i.is_istio || i.name == "istio-system")
            .map(|i| i.name.clone())
            .collect();
        assert!(istio_system_namespaces(&map, &requested).is_empty());
    }

    #[test]
    fn test_exclusion_clause() {
        assert_eq!(exclusion_clause(&BTreeSet::new()), "");

        let excluded: BTreeSet<String> =
            names(&["istio-system", "istio-ingress"]).into_iter().collect();
        assert_eq!(
            exclusion_clause(&excluded),
            r#",destination_service_namespace!~"istio-ingress|istio-system""#
        );
    }
}
