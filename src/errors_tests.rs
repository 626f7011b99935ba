// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for error types.

#[cfg(test)]
mod tests {
    use crate::errors::*;
    use std::error::Error as _;

    #[test]
    fn test_already_registered_message() {
        let err = RegistryError::ProviderAlreadyRegistered {
            name: "dummy".to_string(),
        };
        assert_eq!(err.to_string(), "provider 'dummy' is already registered");
    }

    #[test]
    fn test_no_such_provider_lists_available() {
        let err = RegistryError::NoSuchProvider {
            name: "unknown".to_string(),
            available: vec!["dummy".to_string(), "f5".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "no such provider 'unknown', available providers: [dummy, f5]"
        );
    }

    #[test]
    fn test_http_error_message_and_status() {
        let err = ProviderError::Http {
            method: "GET".to_string(),
            url: "https://lb/mgmt/tm/ltm/pool/~Common~p".to_string(),
            status: 404,
            message: "not found".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "GET https://lb/mgmt/tm/ltm/pool/~Common~p returned HTTP 404: not found"
        );
    }

    #[test]
    fn test_connection_error_has_no_status() {
        let err = ProviderError::Connection {
            method: "POST".to_string(),
            url: "https://lb".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.status(), None);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_operation_error_wraps_resource_name() {
        let err = BackendError::operation(
            Operation::DeleteVip,
            "VIP-default-web-80",
            ProviderError::NotConnected,
        );
        assert_eq!(
            err.to_string(),
            "delete_vip 'VIP-default-web-80' failed: provider is not connected"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_commit_rollback_detection() {
        let err = BackendError::Commit {
            vendor: "haproxy".to_string(),
            source: ProviderError::Transaction {
                id: "abc".to_string(),
                reason: "version mismatch".to_string(),
                rolled_back: true,
            },
        };
        assert!(err.is_rollback());

        let err = BackendError::Commit {
            vendor: "f5".to_string(),
            source: ProviderError::NotConnected,
        };
        assert!(!err.is_rollback());
    }

    #[test]
    fn test_registry_error_converts() {
        let err: BackendError = RegistryError::NoSuchProvider {
            name: "x".to_string(),
            available: vec![],
        }
        .into();
        assert!(matches!(
            err,
            BackendError::Registry(RegistryError::NoSuchProvider { .. })
        ));
    }

    #[test]
    fn test_credentials_error_names_secret_and_key() {
        let err = CredentialsError::MissingKey {
            namespace: "default".to_string(),
            name: "bigip-credentials".to_string(),
            key: "password",
        };
        assert_eq!(
            err.to_string(),
            "secret default/bigip-credentials has no 'password' key"
        );
    }
}
