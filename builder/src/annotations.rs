//! Ingress annotation lookup with legacy-prefix fallback.
//!
//! Grounded on the teacher's `ns_or_default_with_reindex`-style small pure
//! helpers in `k8s/index/src/index.rs`; generalized here to the two
//! overlapping annotation prefixes spec.md §9 calls out: `new wins, legacy
//! is fallback`.

use std::collections::BTreeMap;

const CURRENT_PREFIX: &str = "projectcontour.io/";
const LEGACY_PREFIX: &str = "contour.heptio.com/";

/// Looks up `key` under the current annotation prefix first, falling back
/// to the legacy prefix if absent (spec.md §9 open question).
pub fn get<'a>(annotations: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    annotations
        .get(&format!("{CURRENT_PREFIX}{key}"))
        .or_else(|| annotations.get(&format!("{LEGACY_PREFIX}{key}")))
        .map(String::as_str)
}

pub fn get_bool(annotations: &BTreeMap<String, String>, key: &str, default: bool) -> bool {
    match get(annotations, key) {
        Some("true") => true,
        Some("false") => false,
        _ => default,
    }
}

pub fn get_u32(annotations: &BTreeMap<String, String>, key: &str) -> Option<u32> {
    get(annotations, key)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_prefix_wins_over_legacy() {
        let mut annotations = BTreeMap::new();
        annotations.insert("projectcontour.io/tls-required".to_string(), "true".to_string());
        annotations.insert("contour.heptio.com/tls-required".to_string(), "false".to_string());
        assert_eq!(get(&annotations, "tls-required"), Some("true"));
    }

    #[test]
    fn legacy_prefix_is_fallback() {
        let mut annotations = BTreeMap::new();
        annotations.insert("contour.heptio.com/tls-required".to_string(), "true".to_string());
        assert_eq!(get(&annotations, "tls-required"), Some("true"));
    }
}
