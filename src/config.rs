// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration record for a tsk run.
//!
//! [`Settings`] is the raw, possibly incomplete input gathered from flags and
//! environment variables. [`Settings::validate`] turns it into the immutable
//! [`Config`] that every other component borrows read-only. Validation happens
//! before any resource is declared, so a [`ConfigError`] never has a partial effect.
//!
//! # Example
//!
//! ```rust,no_run
//! use tsk::config::Settings;
//!
//! let settings = Settings {
//!     storage_dir: "/tmp/tsk".into(),
//!     ephemeral_key: "tskey-auth-xxx".into(),
//!     api_key: "tskey-api-xxx".into(),
//!     tailnet: "example.ts.net".into(),
//!     hostname: "node1".into(),
//!     username: "alice".into(),
//!     namespace: "default".into(),
//!     service_cidr: "10.0.0.0/24".into(),
//! };
//! let config = settings.validate().unwrap();
//! assert_eq!(config.identity_name(), "tsk-alice");
//! ```

use crate::constants::{
    DNS1123_LABEL_MAX_LEN, DNS1123_SUBDOMAIN_MAX_LEN, IDENTITY_NAME_PREFIX, LABEL_VALUE_MAX_LEN,
};
use crate::errors::ConfigError;
use ipnet::IpNet;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Unvalidated settings as collected from the command line and environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub storage_dir: PathBuf,
    pub ephemeral_key: String,
    pub api_key: String,
    pub tailnet: String,
    pub hostname: String,
    pub username: String,
    pub namespace: String,
    pub service_cidr: String,
}

/// Validated configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `file://` URL of the directory holding stack state
    pub backend_url: Url,
    pub tailscale: TailscaleConfig,
    pub kubernetes: KubernetesConfig,
}

/// Tailscale half of the configuration record.
#[derive(Clone, PartialEq, Eq)]
pub struct TailscaleConfig {
    pub ephemeral_key: String,
    pub api_key: String,
    pub tailnet: String,
    pub hostname: String,
}

// Keys stay out of logs.
impl std::fmt::Debug for TailscaleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailscaleConfig")
            .field("ephemeral_key", &"<redacted>")
            .field("api_key", &"<redacted>")
            .field("tailnet", &self.tailnet)
            .field("hostname", &self.hostname)
            .finish()
    }
}

/// Kubernetes half of the configuration record.
///
/// This is also the input of the Corefile template, hence `Serialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    pub username: String,
    pub namespace: String,
    pub service_cidr: String,
}

impl Config {
    /// Name shared by every Kubernetes object of this node: `tsk-<username>`.
    #[must_use]
    pub fn identity_name(&self) -> String {
        identity_name_for(&self.kubernetes.username)
    }

    /// Fully qualified tailnet name the node registers under: `<hostname>.<tailnet>`.
    #[must_use]
    pub fn device_fqdn(&self) -> String {
        format!("{}.{}", self.tailscale.hostname, self.tailscale.tailnet)
    }
}

impl Settings {
    /// Validate the settings and build the configuration record.
    ///
    /// Required fields are checked first, then the hostname, the identity name, the
    /// values that end up in object labels and the service CIDR. Finally the storage
    /// directory is resolved (and created if missing).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid setting.
    pub fn validate(self) -> Result<Config, ConfigError> {
        require(
            &self.ephemeral_key,
            "Tailscale Ephemeral Key",
            "--ephemeral-key|TSK_EPHEMERAL_KEY",
        )?;
        require(&self.api_key, "Tailscale API Key", "--api-key|TSK_API_KEY")?;
        require(&self.tailnet, "Tailscale Tailnet", "-N|--tailnet|TSK_TAILNET")?;
        require(
            &self.hostname,
            "Tailscale Hostname",
            "-H|--hostname|TSK_HOSTNAME",
        )?;
        require(
            &self.namespace,
            "Kubernetes Namespace",
            "-n|--namespace|TSK_NAMESPACE",
        )?;
        require(
            &self.username,
            "Kubernetes Username",
            "-u|--username|TSK_USERNAME",
        )?;

        validate_dns1123_label(&self.hostname)?;
        let identity = identity_name_for(&self.username);
        validate_dns1123_subdomain(&identity)?;
        validate_label_value("Kubernetes Username", &self.username)?;
        validate_label_value("Derived resource name", &identity)?;
        validate_label_value("Tailscale Tailnet", &self.tailnet)?;
        parse_service_cidr(&self.service_cidr)?;

        let backend_url = prepare_storage_dir(&self.storage_dir)?;

        debug!(
            backend = %backend_url,
            hostname = %self.hostname,
            tailnet = %self.tailnet,
            namespace = %self.namespace,
            "Configuration validated"
        );

        Ok(Config {
            backend_url,
            tailscale: TailscaleConfig {
                ephemeral_key: self.ephemeral_key,
                api_key: self.api_key,
                tailnet: self.tailnet,
                hostname: self.hostname,
            },
            kubernetes: KubernetesConfig {
                username: self.username,
                namespace: self.namespace,
                service_cidr: self.service_cidr,
            },
        })
    }
}

fn require(value: &str, field: &'static str, hint: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField { field, hint });
    }
    Ok(())
}

fn identity_name_for(username: &str) -> String {
    format!("{IDENTITY_NAME_PREFIX}-{username}")
}

/// Parse the Kubernetes service CIDR.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidCidr`] if the value is not `<address>/<prefix>`.
pub fn parse_service_cidr(value: &str) -> Result<IpNet, ConfigError> {
    value
        .parse::<IpNet>()
        .map_err(|e| ConfigError::InvalidCidr {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Check that `name` is a valid DNS-1123 subdomain (the rule for most Kubernetes object names).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidIdentityName`] describing the violated rule.
pub fn validate_dns1123_subdomain(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidIdentityName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() > DNS1123_SUBDOMAIN_MAX_LEN {
        return Err(invalid("must be no more than 253 characters"));
    }

    for label in name.split('.') {
        let bytes = label.as_bytes();
        let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
            return Err(invalid("must not contain empty labels"));
        };
        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(invalid("must start and end with an alphanumeric character"));
        }
        if bytes
            .iter()
            .any(|b| !(b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-'))
        {
            return Err(invalid(
                "must consist of lower case alphanumeric characters, '-' or '.'",
            ));
        }
    }

    Ok(())
}

/// Check that `name` is a valid DNS-1123 label.
///
/// The hostname names the stack and its state file, so this also keeps it to a single
/// path component.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidHostname`] describing the violated rule.
pub fn validate_dns1123_label(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidHostname {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() > DNS1123_LABEL_MAX_LEN {
        return Err(invalid("must be no more than 63 characters"));
    }

    let bytes = name.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return Err(invalid("must not be empty"));
    };
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(invalid("must start and end with an alphanumeric character"));
    }
    if bytes
        .iter()
        .any(|b| !(b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-'))
    {
        return Err(invalid("must consist of lower case alphanumeric characters or '-'"));
    }

    Ok(())
}

/// Check that `value` can be stored as a Kubernetes label value.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidLabelValue`] describing the violated rule.
pub fn validate_label_value(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidLabelValue {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    if value.len() > LABEL_VALUE_MAX_LEN {
        return Err(invalid("must be no more than 63 characters"));
    }

    let bytes = value.as_bytes();
    if let (Some(first), Some(last)) = (bytes.first(), bytes.last()) {
        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(invalid("must start and end with an alphanumeric character"));
        }
    }
    if bytes
        .iter()
        .any(|b| !(b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')))
    {
        return Err(invalid("must consist of alphanumeric characters, '-', '_' or '.'"));
    }

    Ok(())
}

/// Resolve the storage directory and return its `file://` backend URL.
///
/// Relative paths are resolved against the current directory. A missing
/// directory is created; an existing non-directory is rejected.
///
/// # Errors
///
/// Returns [`ConfigError::StorageDir`] if the path cannot be resolved, created or used.
pub fn prepare_storage_dir(path: &Path) -> Result<Url, ConfigError> {
    let storage_err = |reason: String| ConfigError::StorageDir {
        path: path.display().to_string(),
        reason,
    };

    if path.as_os_str().is_empty() {
        return Err(storage_err("path is empty".into()));
    }

    let absolute = std::path::absolute(path).map_err(|e| storage_err(e.to_string()))?;

    match std::fs::metadata(&absolute) {
        Ok(meta) if !meta.is_dir() => {
            return Err(storage_err("configured storage dir is not a directory".into()));
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %absolute.display(), "Creating storage dir");
            std::fs::create_dir_all(&absolute).map_err(|e| storage_err(e.to_string()))?;
        }
        Err(e) => return Err(storage_err(e.to_string())),
    }

    Url::from_directory_path(&absolute)
        .map_err(|()| storage_err("path cannot be expressed as a file:// URL".into()))
}
