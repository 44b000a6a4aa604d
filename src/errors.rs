// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for tsk.
//!
//! This module provides specialized error types for:
//! - Configuration validation (missing flags, bad CIDR, invalid names and label values)
//! - Tailscale HTTP API operations (device listing, routes, DNS settings)
//! - The declarative engine (graph validation, providers, state backend)
//!
//! Application layers wrap these with `anyhow::Context` to add the step that failed.

use thiserror::Error;

/// Errors raised while validating the configuration record.
///
/// Every variant is detected before any resource is declared, so a configuration
/// error never has a partial effect on the cluster or the tailnet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting was empty
    #[error("{field} is required, consider setting {hint}")]
    MissingField {
        /// Human-readable name of the setting
        field: &'static str,
        /// Flags and environment variable that provide the setting
        hint: &'static str,
    },

    /// The Kubernetes service CIDR did not parse
    #[error("Unable to parse kubernetes service cidr '{value}': {reason}")]
    InvalidCidr {
        /// The rejected value
        value: String,
        /// Parser message
        reason: String,
    },

    /// The derived identity name is not a valid DNS-1123 subdomain
    #[error("Derived resource name '{name}' is not a valid Kubernetes name: {reason}")]
    InvalidIdentityName {
        /// The derived name (`tsk-<username>`)
        name: String,
        /// Which DNS-1123 rule was violated
        reason: String,
    },

    /// A setting copied into object labels is not a valid label value
    #[error("{field} '{value}' cannot be used as a Kubernetes label value: {reason}")]
    InvalidLabelValue {
        /// Human-readable name of the setting
        field: &'static str,
        /// The rejected value
        value: String,
        /// Which label value rule was violated
        reason: String,
    },

    /// The hostname is not a valid DNS-1123 label
    #[error("Tailscale hostname '{name}' is invalid: {reason}")]
    InvalidHostname {
        /// The rejected hostname
        name: String,
        /// Which DNS-1123 rule was violated
        reason: String,
    },

    /// The storage directory could not be resolved or created
    #[error("Unable to prepare storage dir '{path}': {reason}")]
    StorageDir {
        /// The configured path
        path: String,
        /// Underlying I/O or validation message
        reason: String,
    },
}

/// Errors that can occur while talking to the Tailscale API.
#[derive(Error, Debug, Clone)]
pub enum MeshError {
    /// The request never produced an HTTP response
    #[error("HTTP request to {endpoint} failed: {reason}")]
    Transport {
        /// The URL that was requested
        endpoint: String,
        /// Reason reported by the HTTP client
        reason: String,
    },

    /// The API answered with a non-success status
    #[error("Tailscale API {endpoint} returned HTTP {status_code}: {body}")]
    UnexpectedStatus {
        /// The URL that was requested
        endpoint: String,
        /// HTTP status code
        status_code: u16,
        /// Response body, as returned
        body: String,
    },

    /// The response body could not be decoded
    #[error("Malformed response from {endpoint}: {reason}")]
    MalformedResponse {
        /// The URL that was requested
        endpoint: String,
        /// Decoder message
        reason: String,
    },
}

impl MeshError {
    /// Returns the HTTP status code if the API answered at all.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Errors raised by the declarative engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Two declarations in one pass resolved to the same URN
    #[error("Duplicate resource declaration '{urn}'")]
    DuplicateResource {
        /// URN of the duplicated resource
        urn: String,
    },

    /// A parent or dependency handle was not declared earlier in the pass
    #[error("Resource '{urn}' references undeclared resource '{reference}'")]
    UnknownReference {
        /// URN of the declaring resource
        urn: String,
        /// URN that could not be resolved
        reference: String,
    },

    /// A resource kind needs a provider plugin that was never installed
    #[error("Provider plugin '{package}' is not installed")]
    MissingPlugin {
        /// Provider package name
        package: String,
    },

    /// A provider call failed
    #[error("Provider failed to {operation} '{urn}': {source}")]
    Provider {
        /// Operation that failed (create, update, delete, read)
        operation: &'static str,
        /// URN of the resource
        urn: String,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },

    /// The device registry query failed
    #[error("Device query failed: {0}")]
    DeviceQuery(#[from] MeshError),

    /// The backend URL is not a `file://` URL
    #[error("Unsupported backend URL '{0}', only file:// backends are supported")]
    UnsupportedBackend(String),

    /// Reading or writing the state file failed
    #[error("State backend I/O error on {path}: {source}")]
    StateIo {
        /// State file path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The state file could not be (de)serialized
    #[error("State file {path} is corrupt: {source}")]
    StateFormat {
        /// State file path
        path: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// A resource payload could not be serialized into recorded inputs
    #[error("Unable to serialize inputs of '{urn}': {source}")]
    Inputs {
        /// URN of the resource
        urn: String,
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },
}
