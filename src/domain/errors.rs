//! Domain error types

use thiserror::Error;

/// Errors from the ephemeral counter store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Counter store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Counter store protocol error: {message}")]
    Protocol { message: String },
}

/// Errors from the quota registry lookup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Registry database error: {message}")]
    Database { message: String },
}

/// Errors from the durable usage store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UsageStoreError {
    #[error("Usage store database error: {message}")]
    Database { message: String },
}

/// Why a request was refused admission.
///
/// `StoreUnavailable` is deliberately distinct from `RateLimited`: both
/// map to an external 429 under the fail-closed policy, but observability
/// must be able to tell a store outage apart from genuine quota
/// exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No credential header was presented
    MissingCredential,
    /// Credential unknown or disabled
    InvalidCredential,
    /// The scoped endpoint is administratively disabled
    EndpointDisabled,
    /// The per-minute ceiling for the credential's tier was exceeded
    RateLimited {
        /// Seconds until the fixed window resets
        retry_after_secs: u64,
    },
    /// The counter store was unreachable and the fail-closed policy applied
    StoreUnavailable,
}

impl RejectReason {
    /// Machine-readable reason code carried in rejection responses.
    ///
    /// A store outage keeps the externally observable `RATE_LIMITED`
    /// code; the distinct cause is only surfaced internally.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::MissingCredential => "MISSING_CREDENTIAL",
            RejectReason::InvalidCredential => "INVALID_CREDENTIAL",
            RejectReason::EndpointDisabled => "ENDPOINT_DISABLED",
            RejectReason::RateLimited { .. } | RejectReason::StoreUnavailable => "RATE_LIMITED",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_codes() {
        assert_eq!(RejectReason::MissingCredential.code(), "MISSING_CREDENTIAL");
        assert_eq!(RejectReason::InvalidCredential.code(), "INVALID_CREDENTIAL");
        assert_eq!(RejectReason::EndpointDisabled.code(), "ENDPOINT_DISABLED");
        assert_eq!(
            RejectReason::RateLimited {
                retry_after_secs: 60
            }
            .code(),
            "RATE_LIMITED"
        );
        // Store outage is externally indistinguishable from throttling
        assert_eq!(RejectReason::StoreUnavailable.code(), "RATE_LIMITED");
    }
}
