//! Login, verify and revoke orchestration.
//!
//! Every operation is admitted by the rate limiter before it touches the
//! store. Verification checks run in a fixed order and short-circuit:
//! lookup, revocation, expiry, quota, then permissions. Usage is counted only
//! after every check has passed.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use std::{sync::Arc, time::Duration as StdDuration};
use tracing::{error, info, instrument, warn};

use super::{
    error::{AuthError, SessionRejection, StoreError},
    generate_session_key, is_valid_session_key,
    store::{CreateSessionParams, Session, SessionInfo, SessionStore},
};
use crate::{
    apps::AppRegistry,
    clock::Clock,
    rate_limit::{FixedWindowRateLimiter, RateLimitAction},
    redact::redact,
    verifier::{CredentialType, NullifierRegistry, ProofRequest, ProofVerifier, VerifyError},
};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_MAX_USAGE: u32 = 100;
const DEFAULT_VERIFIER_TIMEOUT_SECONDS: u64 = 5;

/// What a newly issued session looks like.
#[derive(Clone, Debug)]
pub struct SessionPolicy {
    app_id: String,
    ttl: Duration,
    max_usage: u32,
    permissions: Vec<String>,
    verifier_timeout: StdDuration,
    require_registered_app: bool,
}

impl SessionPolicy {
    #[must_use]
    pub fn new(app_id: String) -> Self {
        Self {
            app_id,
            ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECONDS),
            max_usage: DEFAULT_MAX_USAGE,
            permissions: vec!["read".to_string(), "write".to_string()],
            verifier_timeout: StdDuration::from_secs(DEFAULT_VERIFIER_TIMEOUT_SECONDS),
            require_registered_app: false,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_usage(mut self, max_usage: u32) -> Self {
        self.max_usage = max_usage;
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    #[must_use]
    pub fn with_verifier_timeout(mut self, timeout: StdDuration) -> Self {
        self.verifier_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_require_registered_app(mut self, require: bool) -> Self {
        self.require_registered_app = require;
        self
    }

    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub fn max_usage(&self) -> u32 {
        self.max_usage
    }

    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    #[must_use]
    pub fn verifier_timeout(&self) -> StdDuration {
        self.verifier_timeout
    }

    #[must_use]
    pub fn require_registered_app(&self) -> bool {
        self.require_registered_app
    }
}

/// Raw login input; fields may be empty until validated.
#[derive(Clone, Debug, Default)]
pub struct LoginRequest {
    pub proof: String,
    pub nullifier_hash: String,
    pub merkle_root: String,
    pub credential_type: Option<String>,
    /// Registered app the login is made on behalf of.
    pub app_id: Option<String>,
}

impl LoginRequest {
    fn into_proof_request(self) -> Result<ProofRequest, AuthError> {
        let proof = self.proof.trim().to_string();
        let nullifier_hash = self.nullifier_hash.trim().to_string();
        let merkle_root = self.merkle_root.trim().to_string();
        if proof.is_empty() || nullifier_hash.is_empty() || merkle_root.is_empty() {
            return Err(AuthError::Validation(
                "Missing required fields: proof, nullifierHash, merkleRoot".to_string(),
            ));
        }
        let credential_type = match self.credential_type.as_deref() {
            None | Some("") => CredentialType::default(),
            Some(value) => value.parse().map_err(AuthError::Validation)?,
        };
        Ok(ProofRequest {
            proof,
            nullifier_hash,
            merkle_root,
            credential_type,
        })
    }
}

/// Returned once, at login. The only place the session key leaves the service.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub session_key: String,
    pub expires_at: DateTime<Utc>,
    pub max_usage: u32,
    pub permissions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedSession {
    pub expires_at: DateTime<Utc>,
    /// Usage count after this verification was counted.
    pub usage_count: u32,
    pub max_usage: u32,
    pub permissions: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub sessions_removed: usize,
    pub rate_limits_removed: usize,
}

#[derive(Clone)]
pub struct SessionService {
    clock: Arc<dyn Clock>,
    limiter: Arc<FixedWindowRateLimiter>,
    store: Arc<SessionStore>,
    verifier: Arc<dyn ProofVerifier>,
    nullifiers: Arc<dyn NullifierRegistry>,
    apps: Arc<AppRegistry>,
    policy: SessionPolicy,
}

impl SessionService {
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        limiter: Arc<FixedWindowRateLimiter>,
        store: Arc<SessionStore>,
        verifier: Arc<dyn ProofVerifier>,
        nullifiers: Arc<dyn NullifierRegistry>,
        apps: Arc<AppRegistry>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            clock,
            limiter,
            store,
            verifier,
            nullifiers,
            apps,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn limiter(&self) -> &FixedWindowRateLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn apps(&self) -> &AppRegistry {
        &self.apps
    }

    #[must_use]
    pub fn verifier(&self) -> &dyn ProofVerifier {
        self.verifier.as_ref()
    }

    /// Count one request from `caller` against the quota for `action`.
    ///
    /// # Errors
    /// Returns `AuthError::RateLimited` with the window end when the quota is spent.
    pub async fn admit(&self, caller: &str, action: RateLimitAction) -> Result<(), AuthError> {
        let status = self.limiter.check_action(caller, action).await;
        if status.is_allowed() {
            Ok(())
        } else {
            warn!(caller, action = %action, "Rate limit exceeded");
            let remaining_ms = (status.reset_at - self.clock.now())
                .num_milliseconds()
                .max(0);
            Err(AuthError::RateLimited {
                reset_at: status.reset_at,
                retry_after_seconds: ((remaining_ms + 999) / 1000).max(1),
            })
        }
    }

    /// The app a new session is issued for. A named app must be an approved
    /// registration; without one the configured World ID app is used unless
    /// registration is enforced.
    async fn resolve_app(&self, requested: Option<String>) -> Result<String, AuthError> {
        match requested {
            Some(app_id) if self.apps.is_approved(&app_id).await => Ok(app_id),
            Some(app_id) => {
                warn!(app_id = %app_id, "Login names an app that is not approved");
                Err(AuthError::AppNotRegistered)
            }
            None if self.policy.require_registered_app => {
                warn!("Login without an app id while registration is enforced");
                Err(AuthError::AppNotRegistered)
            }
            None => Ok(self.policy.app_id.clone()),
        }
    }

    /// Exchange an accepted proof of personhood for a new session.
    ///
    /// # Errors
    /// Fails when rate limited, on missing fields, when the proof is rejected or
    /// the verifier times out, or when the nullifier already backs a live session.
    #[instrument(skip(self, request))]
    pub async fn login(&self, caller: &str, request: LoginRequest) -> Result<IssuedSession, AuthError> {
        self.admit(caller, RateLimitAction::Login).await?;
        let requested_app = request
            .app_id
            .as_deref()
            .map(str::trim)
            .filter(|app_id| !app_id.is_empty())
            .map(str::to_string);
        let proof = request.into_proof_request()?;
        let app_id = self.resolve_app(requested_app).await?;

        let nullifier = redact(&proof.nullifier_hash);
        match tokio::time::timeout(self.policy.verifier_timeout, self.verifier.verify(&proof)).await {
            Ok(Ok(())) => {}
            Ok(Err(VerifyError::Rejected(rejection))) => {
                warn!(nullifier = %nullifier, "World ID verification failed: {rejection}");
                return Err(AuthError::ProofRejected(rejection));
            }
            Ok(Err(VerifyError::Unavailable(err))) => {
                error!(nullifier = %nullifier, "World ID verifier unavailable: {err:#}");
                return Err(AuthError::VerifierUnavailable(err));
            }
            Err(_) => {
                warn!(
                    nullifier = %nullifier,
                    timeout_ms = self.policy.verifier_timeout.as_millis(),
                    "World ID verification timed out"
                );
                return Err(AuthError::VerificationTimeout);
            }
        }

        if self.nullifiers.is_used(&proof.nullifier_hash).await? {
            warn!(nullifier = %nullifier, "Nullifier already backs a live session");
            return Err(AuthError::NullifierReplayed);
        }

        let session_key = generate_session_key()?;
        let expires_at = self.clock.now() + self.policy.ttl;
        // A concurrent login with the same proof may have won since `is_used`.
        if !self
            .nullifiers
            .claim(&proof.nullifier_hash, &session_key, expires_at)
            .await?
        {
            warn!(nullifier = %nullifier, "Nullifier claimed by a concurrent login");
            return Err(AuthError::NullifierReplayed);
        }

        let params = CreateSessionParams {
            session_key: session_key.clone(),
            nullifier_hash: proof.nullifier_hash.clone(),
            app_id,
            expires_at,
            max_usage: self.policy.max_usage,
            permissions: self.policy.permissions.clone(),
        };
        let session = match self.store.create(params).await {
            Ok(session) => session,
            Err(StoreError::DuplicateKey) => {
                self.nullifiers
                    .release(&proof.nullifier_hash, &session_key)
                    .await?;
                error!(session_key = %redact(&session_key), "Session key collision");
                return Err(AuthError::Internal(anyhow!("session key collision")));
            }
        };

        info!(
            session_key = %redact(&session.session_key),
            nullifier = %nullifier,
            "Login successful"
        );

        Ok(IssuedSession {
            session_key: session.session_key,
            expires_at: session.expires_at,
            max_usage: session.max_usage,
            permissions: session.permissions,
        })
    }

    /// Check a session and, if every check passes, count one use.
    ///
    /// # Errors
    /// Fails when rate limited, on a malformed key, or with the first
    /// `SessionRejection` that applies.
    #[instrument(skip(self, session_key, required_permissions))]
    pub async fn verify(
        &self,
        caller: &str,
        session_key: &str,
        required_permissions: &[String],
    ) -> Result<VerifiedSession, AuthError> {
        self.admit(caller, RateLimitAction::Verify).await?;
        validate_session_key(session_key)?;
        let key = redact(session_key);

        let session = match self.store.verify(session_key).await {
            Ok(session) => session,
            Err(rejection) => {
                warn!(session_key = %key, reason = %rejection, "Session rejected");
                return Err(AuthError::Session(rejection));
            }
        };

        if !session.grants(required_permissions) {
            warn!(
                session_key = %key,
                required = ?required_permissions,
                available = ?session.permissions,
                "Insufficient permissions"
            );
            return Err(AuthError::Session(SessionRejection::PermissionDenied));
        }

        let Some(usage_count) = self.store.increment_usage(session_key).await else {
            // Another caller spent the last use, or revoked it, after our check.
            let rejection = self
                .store
                .verify(session_key)
                .await
                .err()
                .unwrap_or(SessionRejection::QuotaExceeded);
            warn!(session_key = %key, reason = %rejection, "Session rejected at increment");
            return Err(AuthError::Session(rejection));
        };

        info!(session_key = %key, usage_count, "Session verified successfully");

        Ok(VerifiedSession {
            expires_at: session.expires_at,
            usage_count,
            max_usage: session.max_usage,
            permissions: session.permissions,
        })
    }

    /// Revoke a session and free its nullifier.
    ///
    /// # Errors
    /// Fails when rate limited, on a malformed key, or with `AuthError::NotFound`.
    #[instrument(skip(self, session_key))]
    pub async fn revoke(&self, caller: &str, session_key: &str) -> Result<(), AuthError> {
        self.admit(caller, RateLimitAction::Revoke).await?;
        validate_session_key(session_key)?;
        let key = redact(session_key);

        let Some(session) = self.store.get(session_key).await else {
            warn!(session_key = %key, "Session revocation failed - session not found");
            return Err(AuthError::NotFound);
        };
        if !self.store.revoke(session_key).await {
            warn!(session_key = %key, "Session swept before revocation");
            return Err(AuthError::NotFound);
        }
        self.nullifiers
            .release(&session.nullifier_hash, session_key)
            .await?;

        info!(session_key = %key, "Session revoked successfully");
        Ok(())
    }

    pub async fn session_info(&self, session_key: &str) -> Option<SessionInfo> {
        self.store.info(session_key).await
    }

    /// Drop dead sessions and elapsed rate-limit windows.
    ///
    /// # Errors
    /// Returns an error if a nullifier binding cannot be released.
    pub async fn sweep(&self) -> anyhow::Result<MaintenanceReport> {
        let removed: Vec<Session> = self.store.drain_expired().await;
        for session in &removed {
            self.nullifiers
                .release(&session.nullifier_hash, &session.session_key)
                .await?;
        }
        let rate_limits_removed = self.limiter.sweep().await;
        Ok(MaintenanceReport {
            sessions_removed: removed.len(),
            rate_limits_removed,
        })
    }
}

fn validate_session_key(session_key: &str) -> Result<(), AuthError> {
    if session_key.is_empty() {
        return Err(AuthError::Validation(
            "Missing required field: sessionKey".to_string(),
        ));
    }
    if !is_valid_session_key(session_key) {
        return Err(AuthError::Validation("Invalid session key format".to_string()));
    }
    Ok(())
}
