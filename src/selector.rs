//! Label selector matching shared by the bundle assembler (C4, matching
//! `ConfigMap`/`Secret` objects against a source's `selector`) and the
//! namespace fan-out controller (C6, matching namespace labels against
//! `target.namespaceSelector`).
//!
//! `kube`'s `ListParams::labels` takes a pre-built Kubernetes selector
//! string; rather than round-tripping a `LabelSelector` through that
//! encoding, objects are listed unfiltered within their scope and matched
//! in-memory here, which keeps `matchExpressions` evaluation identical
//! between both call sites.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

/// An empty selector (no `matchLabels`, no `matchExpressions`) matches
/// every object, per the Open Question decision recorded in DESIGN.md.
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    if let Some(match_labels) = &selector.match_labels {
        for (k, v) in match_labels {
            if labels.get(k) != Some(v) {
                return false;
            }
        }
    }
    if let Some(expressions) = &selector.match_expressions {
        for expr in expressions {
            if !matches_expression(expr, labels) {
                return false;
            }
        }
    }
    true
}

fn matches_expression(expr: &LabelSelectorRequirement, labels: &BTreeMap<String, String>) -> bool {
    let values = expr.values.as_deref().unwrap_or(&[]);
    match expr.operator.as_str() {
        "In" => labels.get(&expr.key).is_some_and(|v| values.contains(v)),
        "NotIn" => !labels.get(&expr.key).is_some_and(|v| values.contains(v)),
        "Exists" => labels.contains_key(&expr.key),
        "DoesNotExist" => !labels.contains_key(&expr.key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(matches(&selector, &labels(&[])));
        assert!(matches(&selector, &labels(&[("env", "prod")])));
    }

    #[test]
    fn match_labels_requires_exact_equality() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("env", "prod")])),
            match_expressions: None,
        };
        assert!(matches(&selector, &labels(&[("env", "prod"), ("tier", "web")])));
        assert!(!matches(&selector, &labels(&[("env", "staging")])));
        assert!(!matches(&selector, &labels(&[])));
    }

    #[test]
    fn in_and_not_in_operators() {
        let selector = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["prod".to_string(), "staging".to_string()]),
            }]),
        };
        assert!(matches(&selector, &labels(&[("env", "prod")])));
        assert!(!matches(&selector, &labels(&[("env", "dev")])));

        let not_in = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "env".to_string(),
                operator: "NotIn".to_string(),
                values: Some(vec!["prod".to_string()]),
            }]),
        };
        assert!(matches(&not_in, &labels(&[("env", "dev")])));
        assert!(!matches(&not_in, &labels(&[("env", "prod")])));
    }

    #[test]
    fn exists_and_does_not_exist_operators() {
        let exists = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "Exists".to_string(),
                values: None,
            }]),
        };
        assert!(matches(&exists, &labels(&[("tier", "web")])));
        assert!(!matches(&exists, &labels(&[])));

        let does_not_exist = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "tier".to_string(),
                operator: "DoesNotExist".to_string(),
                values: None,
            }]),
        };
        assert!(matches_does_not_exist_when_absent(&does_not_exist));
    }

    fn matches_does_not_exist_when_absent(selector: &LabelSelector) -> bool {
        matches(selector, &labels(&[])) && !matches(selector, &labels(&[("tier", "web")]))
    }
}
