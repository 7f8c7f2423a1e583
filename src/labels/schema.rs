//! Typed views over a decoded label section.
//!
//! # Design Decisions
//! - Field names match case-insensitively, an exact match is preferred
//! - Unknown keys are ignored so new label namespaces stay compatible
//! - Only a shape mismatch (section where a string is expected, or the
//!   reverse) is an error

use std::collections::BTreeMap;

use thiserror::Error;

use crate::labels::decoder::{LabelTree, LabelValue};

/// A label section did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("label `{path}` must be {expected}, found {found}")]
pub struct DecodeError {
    pub path: String,
    pub expected: &'static str,
    pub found: &'static str,
}

/// Settings carried by the controller's own labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerLabels {
    pub class: String,
    pub global: String,
    pub defaults: String,
    pub frontends: BTreeMap<String, String>,
}

/// Settings carried by one service's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendLabels {
    pub port: String,
    pub backend: String,
    pub frontends: BTreeMap<String, String>,
}

impl ControllerLabels {
    pub fn decode(namespace: &str, section: &LabelTree) -> Result<Self, DecodeError> {
        let fields = Fields::new(namespace, section);
        Ok(Self {
            class: fields.string("class")?,
            global: fields.string("global")?,
            defaults: fields.string("defaults")?,
            frontends: fields.string_map("frontend")?,
        })
    }
}

impl BackendLabels {
    pub fn decode(namespace: &str, section: &LabelTree) -> Result<Self, DecodeError> {
        let fields = Fields::new(namespace, section);
        Ok(Self {
            port: fields.string("port")?,
            backend: fields.string("backend")?,
            frontends: fields.string_map("frontend")?,
        })
    }
}

struct Fields<'a> {
    prefix: &'a str,
    section: &'a LabelTree,
}

impl<'a> Fields<'a> {
    fn new(prefix: &'a str, section: &'a LabelTree) -> Self {
        Self { prefix, section }
    }

    fn lookup(&self, field: &str) -> Option<(&'a String, &'a LabelValue)> {
        self.section.get_key_value(field).or_else(|| {
            self.section
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(field))
        })
    }

    fn path(&self, key: &str) -> String {
        format!("{}.{}", self.prefix, key)
    }

    fn string(&self, field: &str) -> Result<String, DecodeError> {
        match self.lookup(field) {
            None => Ok(String::new()),
            Some((_, LabelValue::Scalar(value))) => Ok(value.clone()),
            Some((key, other)) => Err(DecodeError {
                path: self.path(key),
                expected: "a string",
                found: other.kind(),
            }),
        }
    }

    fn string_map(&self, field: &str) -> Result<BTreeMap<String, String>, DecodeError> {
        let entries = match self.lookup(field) {
            None => return Ok(BTreeMap::new()),
            Some((_, LabelValue::Map(entries))) => entries,
            Some((key, other)) => {
                return Err(DecodeError {
                    path: self.path(key),
                    expected: "a nested section",
                    found: other.kind(),
                })
            }
        };

        let mut out = BTreeMap::new();
        for (name, value) in entries {
            match value {
                LabelValue::Scalar(text) => {
                    out.insert(name.clone(), text.clone());
                }
                LabelValue::Map(_) => {
                    return Err(DecodeError {
                        path: format!("{}.{}.{}", self.prefix, field, name),
                        expected: "a string",
                        found: value.kind(),
                    })
                }
            }
        }
        Ok(out)
    }
}
