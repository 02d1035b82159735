//! Error types for the client library.

use aquarest_common::{ConfigError, CredentialError};
use thiserror::Error;

/// Errors that can occur when talking to an Aqua instance.
///
/// Every failure surfaces to the caller; the client never retries or recovers
/// silently. Messages never contain tokens or credentials.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// No instance URL is configured, or the configured one is unusable.
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    /// Supplied key material does not fit the cipher.
    #[error("Invalid key format: expected {expected} bytes, got {actual}")]
    InvalidKeyFormat {
        /// Required key length in bytes.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Supplied IV does not fit the cipher.
    #[error("Invalid IV format: expected {expected} bytes, got {actual}")]
    InvalidIvFormat {
        /// Required IV length in bytes.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// A secret was fetched before one was stored, or cannot be decrypted.
    #[error("Decryption error: {0}")]
    DecryptionError(String),

    /// Transport-level failure: connection refused, timeout, TLS failure.
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest_middleware::Error),

    /// The response body is not valid JSON.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The login response carried no token.
    #[error("Authentication failed: {}", .0.as_deref().unwrap_or("login response contained no token"))]
    AuthenticationFailed(Option<String>),

    /// A page size above the configured ceiling was requested.
    #[error("Page size {requested} exceeds the configured maximum of {max}")]
    PageSizeExceeded {
        /// Page size asked for.
        requested: u32,
        /// Configured ceiling.
        max: u32,
    },

    /// Any other configuration or request construction problem.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Check if this is a transport failure.
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// Check if this is an authentication failure.
    pub const fn is_authentication_error(&self) -> bool {
        matches!(self, Self::AuthenticationFailed(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkError(reqwest_middleware::Error::Reqwest(err))
    }
}

impl From<CredentialError> for ClientError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidKeyFormat {
                expected, actual, ..
            } => Self::InvalidKeyFormat { expected, actual },
            CredentialError::InvalidIvFormat {
                expected, actual, ..
            } => Self::InvalidIvFormat { expected, actual },
            CredentialError::DecryptionError(message) => Self::DecryptionError(message),
            other => Self::Configuration(other.to_string()),
        }
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidInstance(message) => Self::InvalidInstance(message),
            other => Self::Configuration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquarest_common::CipherAlgorithm;

    #[test]
    fn test_credential_errors_map_to_flat_kinds() {
        let err = ClientError::from(CredentialError::InvalidKeyFormat {
            algorithm: CipherAlgorithm::Aes256Cbc,
            expected: 32,
            actual: 8,
        });
        assert!(matches!(
            err,
            ClientError::InvalidKeyFormat {
                expected: 32,
                actual: 8
            }
        ));

        let err = ClientError::from(CredentialError::DecryptionError("nothing".into()));
        assert!(matches!(err, ClientError::DecryptionError(_)));
    }

    #[test]
    fn test_config_errors_map_to_flat_kinds() {
        let err = ClientError::from(ConfigError::InvalidInstance("missing".into()));
        assert!(matches!(err, ClientError::InvalidInstance(_)));

        let err = ClientError::from(ConfigError::InvalidPageSize(0));
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_authentication_failed_message() {
        let err = ClientError::AuthenticationFailed(Some("Invalid credentials".into()));
        assert_eq!(err.to_string(), "Authentication failed: Invalid credentials");
        assert!(err.is_authentication_error());

        let err = ClientError::AuthenticationFailed(None);
        assert_eq!(
            err.to_string(),
            "Authentication failed: login response contained no token"
        );
    }
}
