// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::config::{
        parse_service_cidr, prepare_storage_dir, validate_dns1123_label,
        validate_dns1123_subdomain, validate_label_value, Settings,
    };
    use crate::errors::ConfigError;

    fn valid_settings(dir: &std::path::Path) -> Settings {
        Settings {
            storage_dir: dir.to_path_buf(),
            ephemeral_key: "k".into(),
            api_key: "a".into(),
            tailnet: "example.ts.net".into(),
            hostname: "node1".into(),
            username: "alice".into(),
            namespace: "default".into(),
            service_cidr: "10.0.0.0/24".into(),
        }
    }

    #[test]
    fn test_validate_builds_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = valid_settings(dir.path()).validate().unwrap();

        assert_eq!(config.identity_name(), "tsk-alice");
        assert_eq!(config.device_fqdn(), "node1.example.ts.net");
        assert_eq!(config.kubernetes.service_cidr, "10.0.0.0/24");
        assert_eq!(config.backend_url.scheme(), "file");
        assert!(config.backend_url.as_str().ends_with('/'));
    }

    #[test]
    fn test_missing_ephemeral_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path());
        settings.ephemeral_key = String::new();

        let err = settings.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingField {
                field: "Tailscale Ephemeral Key",
                hint: "--ephemeral-key|TSK_EPHEMERAL_KEY",
            }
        );
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            storage_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().starts_with("Tailscale Ephemeral Key is required"));
    }

    #[test]
    fn test_whitespace_only_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path());
        settings.hostname = "   ".into();

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("-H|--hostname|TSK_HOSTNAME"));
    }

    #[test]
    fn test_invalid_cidr_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path());
        settings.service_cidr = "10.0.0.0".into();

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidCidr { .. })
        ));
    }

    #[test]
    fn test_parse_service_cidr_ipv6() {
        let net = parse_service_cidr("fd00:10:96::/112").unwrap();
        assert_eq!(net.prefix_len(), 112);
    }

    #[test]
    fn test_uppercase_username_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path());
        settings.username = "Alice".into();

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidIdentityName { .. })
        ));
    }

    #[test]
    fn test_dns1123_subdomain_rules() {
        assert!(validate_dns1123_subdomain("tsk-alice").is_ok());
        assert!(validate_dns1123_subdomain("tsk-alice.smith").is_ok());
        assert!(validate_dns1123_subdomain("tsk-alice-").is_err());
        assert!(validate_dns1123_subdomain("tsk-al_ice").is_err());
        assert!(validate_dns1123_subdomain("tsk-alice..b").is_err());
        assert!(validate_dns1123_subdomain(&"a".repeat(254)).is_err());
    }

    #[test]
    fn test_username_at_label_length_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path());
        settings.username = "a".repeat(59);

        let config = settings.validate().unwrap();
        assert_eq!(config.identity_name().len(), 63);
    }

    #[test]
    fn test_username_over_label_length_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path());
        settings.username = "a".repeat(60);

        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidLabelValue {
                field: "Derived resource name",
                ..
            }
        ));
    }

    #[test]
    fn test_tailnet_must_be_label_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = valid_settings(dir.path());
        settings.tailnet = "alice@example.com".into();

        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidLabelValue {
                field: "Tailscale Tailnet",
                ..
            })
        ));
    }

    #[test]
    fn test_label_value_rules() {
        assert!(validate_label_value("f", "example.ts.net").is_ok());
        assert!(validate_label_value("f", "Tail_Net-1").is_ok());
        assert!(validate_label_value("f", &"a".repeat(63)).is_ok());
        assert!(validate_label_value("f", &"a".repeat(64)).is_err());
        assert!(validate_label_value("f", "-tailnet").is_err());
        assert!(validate_label_value("f", "a/b").is_err());
    }

    #[test]
    fn test_hostname_cannot_escape_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        for hostname in ["../node1", "a/b", "node1.example", ".."] {
            let mut settings = valid_settings(dir.path());
            settings.hostname = hostname.into();

            assert!(
                matches!(settings.validate(), Err(ConfigError::InvalidHostname { .. })),
                "{hostname} should be rejected"
            );
        }
    }

    #[test]
    fn test_dns1123_label_rules() {
        assert!(validate_dns1123_label("node1").is_ok());
        assert!(validate_dns1123_label("my-node-2").is_ok());
        assert!(validate_dns1123_label(&"a".repeat(63)).is_ok());
        assert!(validate_dns1123_label(&"a".repeat(64)).is_err());
        assert!(validate_dns1123_label("Node1").is_err());
        assert!(validate_dns1123_label("node-").is_err());
        assert!(validate_dns1123_label("").is_err());
    }

    #[test]
    fn test_storage_dir_created_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state").join("tsk");

        let url = prepare_storage_dir(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(url.to_file_path().unwrap(), nested);
    }

    #[test]
    fn test_storage_dir_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            prepare_storage_dir(&file),
            Err(ConfigError::StorageDir { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = valid_settings(dir.path()).validate().unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("api_key: \"a\""));
    }
}
