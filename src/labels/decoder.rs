//! Flat dotted labels to a nested tree.

use std::collections::{BTreeMap, HashMap};

/// A node of the decoded label tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelValue {
    Scalar(String),
    Map(LabelTree),
}

impl LabelValue {
    pub fn kind(&self) -> &'static str {
        match self {
            LabelValue::Scalar(_) => "a string",
            LabelValue::Map(_) => "a nested section",
        }
    }
}

/// One nesting level, keyed by path segment.
pub type LabelTree = BTreeMap<String, LabelValue>;

/// Key under which a scalar is kept when a longer path descends through it.
pub const WRAPPED_SCALAR_KEY: &str = "";

/// Decode every label into a tree.
///
/// Keys are visited in sorted order, so the outcome of a conflict between
/// `a.b` and `a.b.c` does not depend on map iteration order.
pub fn decode_labels(labels: &HashMap<String, String>) -> LabelTree {
    let sorted: BTreeMap<&String, &String> = labels.iter().collect();
    let mut tree = LabelTree::new();
    for (key, value) in sorted {
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut tree, &segments, value);
    }
    tree
}

/// Decode only the labels of one namespace and return its section.
///
/// Returns `None` when the namespace is absent or only present as a bare
/// scalar label.
pub fn decode_namespace(labels: &HashMap<String, String>, namespace: &str) -> Option<LabelTree> {
    let prefix = format!("{}.", namespace);
    let scoped: HashMap<String, String> = labels
        .iter()
        .filter(|(k, _)| k.as_str() == namespace || k.starts_with(&prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match decode_labels(&scoped).remove(namespace) {
        Some(LabelValue::Map(section)) => Some(section),
        _ => None,
    }
}

fn insert_path(level: &mut LabelTree, segments: &[&str], value: &str) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if rest.is_empty() {
        // a nested section wins over a scalar written at the same key
        if !matches!(level.get(*head), Some(LabelValue::Map(_))) {
            level.insert(head.to_string(), LabelValue::Scalar(value.to_string()));
        }
        return;
    }

    let slot = level
        .entry(head.to_string())
        .or_insert_with(|| LabelValue::Map(LabelTree::new()));

    if let LabelValue::Scalar(existing) = slot {
        let mut wrapped = LabelTree::new();
        wrapped.insert(
            WRAPPED_SCALAR_KEY.to_string(),
            LabelValue::Scalar(std::mem::take(existing)),
        );
        *slot = LabelValue::Map(wrapped);
    }

    if let LabelValue::Map(child) = slot {
        insert_path(child, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn scalar(v: &str) -> LabelValue {
        LabelValue::Scalar(v.to_string())
    }

    #[test]
    fn test_nested_paths() {
        let tree = decode_labels(&labels(&[
            ("ingress.global", "g\n"),
            ("ingress.frontend.default", "f\n"),
            ("other", "x"),
        ]));

        assert_eq!(tree["other"], scalar("x"));
        let LabelValue::Map(ingress) = &tree["ingress"] else {
            panic!("ingress should be a section");
        };
        assert_eq!(ingress["global"], scalar("g\n"));
        let LabelValue::Map(frontend) = &ingress["frontend"] else {
            panic!("frontend should be a section");
        };
        assert_eq!(frontend["default"], scalar("f\n"));
    }

    #[test]
    fn test_namespace_scoping() {
        let section = decode_namespace(
            &labels(&[("ingress.port", "80"), ("com.docker.compose.service", "app")]),
            "ingress",
        )
        .unwrap();
        assert_eq!(section.len(), 1);
        assert_eq!(section["port"], scalar("80"));

        assert!(decode_namespace(&labels(&[("ingressfoo.port", "1")]), "ingress").is_none());
        assert!(decode_namespace(&labels(&[("ingress", "true")]), "ingress").is_none());
    }

    // Conflict handling is kept for compatibility with existing label sets:
    // a scalar followed by a deeper path is wrapped under the empty key.
    #[test]
    fn test_scalar_then_deeper_path_is_wrapped() {
        let section = decode_namespace(
            &labels(&[("ingress.frontend", "plain"), ("ingress.frontend.web", "bind :80")]),
            "ingress",
        )
        .unwrap();

        let LabelValue::Map(frontend) = &section["frontend"] else {
            panic!("frontend should have become a section");
        };
        assert_eq!(frontend[WRAPPED_SCALAR_KEY], scalar("plain"));
        assert_eq!(frontend["web"], scalar("bind :80"));
    }

    // The other direction: a scalar write onto an existing section is ignored.
    #[test]
    fn test_scalar_onto_section_is_ignored() {
        let mut tree = LabelTree::new();
        insert_path(&mut tree, &["a", "b", "c"], "deep");
        insert_path(&mut tree, &["a", "b"], "shallow");

        let LabelValue::Map(a) = &tree["a"] else { panic!() };
        let LabelValue::Map(b) = &a["b"] else {
            panic!("section must survive the scalar write");
        };
        assert_eq!(b["c"], scalar("deep"));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_decoding_is_order_independent() {
        let pairs = [
            ("ingress.backend", "x"),
            ("ingress.backend.extra", "y"),
            ("ingress.frontend.a", "1"),
        ];
        let forward = decode_labels(&labels(&pairs));
        let mut reversed = pairs.to_vec();
        reversed.reverse();
        assert_eq!(forward, decode_labels(&labels(&reversed)));
    }
}
