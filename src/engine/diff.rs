// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Classification of a declaration against recorded state.

use super::graph::Resource;
use super::state::StateEntry;
use serde_json::Value;
use std::fmt;

/// What an operation does to one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Same,
    Create,
    Update,
    Replace,
    Delete,
}

impl Operation {
    /// One-character marker used in plan output.
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Self::Same => ' ',
            Self::Create => '+',
            Self::Update => '~',
            Self::Replace => '±',
            Self::Delete => '-',
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Same => "same",
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
        })
    }
}

/// Decide how a declared resource relates to what was recorded for the same URN.
///
/// A resource whose identity moved (a different namespace or name, or a different
/// device) is replaced. Otherwise any change of inputs is an in-place update.
#[must_use]
pub fn classify(previous: Option<&StateEntry>, resource: &Resource, inputs: &Value) -> Operation {
    let Some(previous) = previous else {
        return Operation::Create;
    };

    if let Some(id) = resource.physical_id() {
        if id != previous.id {
            return Operation::Replace;
        }
    }

    if &previous.inputs == inputs {
        Operation::Same
    } else {
        Operation::Update
    }
}

/// Project a live object onto the shape of its recorded inputs.
///
/// Only fields present in `recorded` are kept, so values the server fills in (uid,
/// status, defaulted fields) never read as drift. A recorded field that is gone from
/// `live` is dropped from the result. Arrays of the same length are projected element
/// by element; an array whose length changed is taken from `live` as a whole.
#[must_use]
pub fn project_onto(recorded: &Value, live: &Value) -> Value {
    match (recorded, live) {
        (Value::Object(shape), Value::Object(live)) => Value::Object(
            shape
                .iter()
                .filter_map(|(key, shape)| {
                    live.get(key)
                        .map(|value| (key.clone(), project_onto(shape, value)))
                })
                .collect(),
        ),
        (Value::Array(shape), Value::Array(live)) if shape.len() == live.len() => Value::Array(
            shape
                .iter()
                .zip(live)
                .map(|(shape, value)| project_onto(shape, value))
                .collect(),
        ),
        (_, live) => live.clone(),
    }
}

/// Dotted paths at which `new` differs from `old`. Arrays are compared whole.
#[must_use]
pub fn changed_paths(old: &Value, new: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    walk(old, new, "", &mut paths);
    paths
}

fn walk(old: &Value, new: &Value, prefix: &str, paths: &mut Vec<String>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                let missing = Value::Null;
                walk(
                    a.get(key).unwrap_or(&missing),
                    b.get(key).unwrap_or(&missing),
                    &path,
                    paths,
                );
            }
        }
        (a, b) if a != b => paths.push(if prefix.is_empty() {
            "(root)".to_string()
        } else {
            prefix.to_string()
        }),
        _ => {}
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
