// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Corefile rendering.
//!
//! The CoreDNS configuration is embedded at compile time and rendered against the
//! Kubernetes half of the configuration record. Placeholders use `{{field}}` where
//! `field` is the camelCase name of a [`KubernetesConfig`] field. Rendering is pure:
//! the same input always yields byte-identical output.

use crate::config::KubernetesConfig;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

// Embed configuration templates at compile time
const COREFILE_TEMPLATE: &str = include_str!("../templates/Corefile.tmpl");

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Errors raised while rendering a template.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// A `{{` was never closed
    #[error("Unterminated placeholder at byte {offset}")]
    Unterminated {
        /// Byte offset of the opening braces
        offset: usize,
    },

    /// A placeholder names a field the input does not have
    #[error("Unknown placeholder '{name}'")]
    UnknownPlaceholder {
        /// The placeholder name
        name: String,
    },

    /// The input could not be flattened into template values
    #[error("Template input is not a flat object: {0}")]
    Input(String),
}

/// Render the embedded Corefile for the given Kubernetes configuration.
///
/// # Errors
///
/// Only a malformed embedded template can fail, which is a programming error.
pub fn render_corefile(kubernetes: &KubernetesConfig) -> Result<String, TemplateError> {
    render(COREFILE_TEMPLATE, kubernetes)
}

/// Render `template` against the fields of `input`.
///
/// `input` must serialize to a JSON object whose values are strings, numbers or booleans.
///
/// # Errors
///
/// Returns an error for unterminated or unknown placeholders, or a non-flat input.
pub fn render<T: Serialize>(template: &str, input: &T) -> Result<String, TemplateError> {
    let values = template_values(input)?;

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut consumed = 0;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let end = after_open.find(CLOSE).ok_or(TemplateError::Unterminated {
            offset: consumed + start,
        })?;

        let name = after_open[..end].trim();
        let value = values
            .get(name)
            .ok_or_else(|| TemplateError::UnknownPlaceholder {
                name: name.to_string(),
            })?;
        out.push_str(value);

        let advanced = start + OPEN.len() + end + CLOSE.len();
        consumed += advanced;
        rest = &rest[advanced..];
    }
    out.push_str(rest);

    Ok(out)
}

fn template_values<T: Serialize>(input: &T) -> Result<BTreeMap<String, String>, TemplateError> {
    let value = serde_json::to_value(input).map_err(|e| TemplateError::Input(e.to_string()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(TemplateError::Input("expected an object".into()));
    };

    map.into_iter()
        .map(|(key, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(TemplateError::Input(format!(
                        "field '{key}' is not a scalar: {other}"
                    )))
                }
            };
            Ok((key, rendered))
        })
        .collect()
}
