//! Error types for authswitch.

use crate::models::ProviderKind;

/// Result alias used across the crate.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Errors surfaced to callers of adapters, the orchestrator and the context.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The upstream source name is not known to the active adapter variant.
    #[error("Provider {provider} not supported by {backend}")]
    UnsupportedProvider {
        provider: String,
        backend: ProviderKind,
    },

    /// A backing library call failed.
    #[error("Failed to {operation} ({backend}): {source}")]
    Operation {
        backend: ProviderKind,
        operation: String,
        #[source]
        source: BackendError,
    },

    /// The auth context was read before an orchestrator was provided.
    #[error("Auth context used before an orchestrator was provided")]
    Uninitialized,

    /// The requested variant has no configuration to build it from.
    #[error("{0} is not configured")]
    NotConfigured(ProviderKind),
}

impl AuthError {
    /// Whether this error wraps a cancelled interactive exchange.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Operation {
                source: BackendError::Cancelled,
                ..
            }
        )
    }
}

/// Failures reported by the backing identity libraries.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The identity service answered with an error status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The user closed or abandoned the interactive exchange.
    #[error("Sign-in cancelled by user")]
    Cancelled,

    /// The identity service answered with a body we could not read.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors raised by preference storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O failure at a specific path.
    #[error("Storage I/O error at {path}: {message}")]
    Io {
        path: std::path::PathBuf,
        message: String,
    },

    /// The stored document could not be (de)serialized.
    #[error("Storage serialization error: {0}")]
    Serialization(String),

    /// Keyring backend error.
    #[error("Keyring error: {0}")]
    Keyring(String),

    /// The key is not usable with this backend.
    #[error("Invalid key '{0}'")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display_names_operation_and_backend() {
        let err = AuthError::Operation {
            backend: ProviderKind::Firebase,
            operation: "sign out".into(),
            source: BackendError::Api {
                status: 500,
                message: "boom".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "Failed to sign out (Firebase): API error 500: boom"
        );
    }

    #[test]
    fn test_unsupported_display() {
        let err = AuthError::UnsupportedProvider {
            provider: "twitter".into(),
            backend: ProviderKind::Firebase,
        };
        assert_eq!(err.to_string(), "Provider twitter not supported by Firebase");
    }

    #[test]
    fn test_is_cancelled() {
        let err = AuthError::Operation {
            backend: ProviderKind::Firebase,
            operation: "sign in".into(),
            source: BackendError::Cancelled,
        };
        assert!(err.is_cancelled());
        assert!(!AuthError::Uninitialized.is_cancelled());
    }
}
