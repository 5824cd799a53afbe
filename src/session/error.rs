use chrono::{DateTime, Utc};
use std::fmt;

use crate::verifier::ProofRejection;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("session key already exists")]
    DuplicateKey,
}

/// Why an existing (or missing) session cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    NotFound,
    Revoked,
    Expired,
    QuotaExceeded,
    PermissionDenied,
}

impl SessionRejection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::QuotaExceeded => "quota_exceeded",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

impl fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("rate limit exceeded until {reset_at}")]
    RateLimited {
        reset_at: DateTime<Utc>,
        /// Whole seconds until `reset_at`, at least one.
        retry_after_seconds: i64,
    },
    #[error("proof rejected: {0}")]
    ProofRejected(ProofRejection),
    #[error("nullifier has already been used")]
    NullifierReplayed,
    #[error("proof verification timed out")]
    VerificationTimeout,
    #[error("proof verifier unavailable")]
    VerifierUnavailable(#[source] anyhow::Error),
    #[error("application is not registered or not approved")]
    AppNotRegistered,
    #[error("session not found or already revoked")]
    NotFound,
    #[error("session rejected: {0}")]
    Session(SessionRejection),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
