//! Fixtures shared by the unit and router tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::{sync::Arc, time::Duration};

use crate::{
    apps::AppRegistry,
    clock::{Clock, ManualClock},
    rate_limit::{FixedWindowRateLimiter, RateLimitPolicy},
    session::{LoginRequest, SessionPolicy, SessionService, SessionStore},
    verifier::{
        DependencyStatus, InMemoryNullifierRegistry, ProofRejection, ProofRequest, ProofVerifier,
        VerifyError,
    },
};

pub(crate) const TEST_APP_ID: &str = "app_0123456789abcdef0123456789abcdef";

/// Verifier with a canned answer.
pub(crate) enum StaticVerifier {
    Accept,
    Reject(ProofRejection),
    Unavailable,
    /// Never answers within any sane timeout.
    Hang,
}

#[async_trait]
impl ProofVerifier for StaticVerifier {
    async fn verify(&self, _request: &ProofRequest) -> Result<(), VerifyError> {
        match self {
            Self::Accept => Ok(()),
            Self::Reject(rejection) => Err(VerifyError::Rejected(rejection.clone())),
            Self::Unavailable => Err(VerifyError::Unavailable(anyhow::anyhow!(
                "connection refused"
            ))),
            Self::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
        }
    }

    fn dependency_status(&self) -> DependencyStatus {
        match self {
            Self::Unavailable => DependencyStatus::Error,
            _ => DependencyStatus::Ok,
        }
    }
}

pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub nullifiers: Arc<InMemoryNullifierRegistry>,
    pub service: SessionService,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            Arc::new(StaticVerifier::Accept),
            RateLimitPolicy::default(),
            false,
        )
    }

    pub fn with_verifier(verifier: Arc<dyn ProofVerifier>) -> Self {
        Self::build(verifier, RateLimitPolicy::default(), false)
    }

    pub fn with_rate_limits(policy: RateLimitPolicy) -> Self {
        Self::build(Arc::new(StaticVerifier::Accept), policy, false)
    }

    pub fn enforcing_registration() -> Self {
        Self::build(
            Arc::new(StaticVerifier::Accept),
            RateLimitPolicy::default(),
            true,
        )
    }

    fn build(
        verifier: Arc<dyn ProofVerifier>,
        rate_limits: RateLimitPolicy,
        require_registered_app: bool,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
                .single()
                .unwrap_or_else(Utc::now),
        ));
        let shared: Arc<dyn Clock> = clock.clone();
        let nullifiers = Arc::new(InMemoryNullifierRegistry::new(shared.clone()));
        let policy = SessionPolicy::new(TEST_APP_ID.to_string())
            .with_verifier_timeout(Duration::from_millis(50))
            .with_require_registered_app(require_registered_app);

        let service = SessionService::new(
            shared.clone(),
            Arc::new(FixedWindowRateLimiter::new(shared.clone(), rate_limits)),
            Arc::new(SessionStore::new(shared.clone())),
            verifier,
            nullifiers.clone(),
            Arc::new(AppRegistry::new(shared)),
            policy,
        );

        Self {
            clock,
            nullifiers,
            service,
        }
    }
}

/// A well-formed session key derived from `seed`.
pub(crate) fn key(seed: u8) -> String {
    format!("{seed:02x}").repeat(32)
}

pub(crate) fn login_request(nullifier_hash: &str) -> LoginRequest {
    LoginRequest {
        proof: "0x1234abcd".to_string(),
        nullifier_hash: nullifier_hash.to_string(),
        merkle_root: "0xfeed".to_string(),
        credential_type: None,
        app_id: None,
    }
}
