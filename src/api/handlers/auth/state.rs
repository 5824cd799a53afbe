//! Auth configuration and the shared state handed to every handler.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};

use crate::{
    apps::AppRegistry,
    clock::{Clock, SystemClock},
    rate_limit::{FixedWindowRateLimiter, RateLimitPolicy},
    session::{SessionPolicy, SessionService, SessionStore},
    verifier::{InMemoryNullifierRegistry, ProofVerifier, WorldIdVerifier},
};

const DEFAULT_WORLD_ID_ACTION: &str = "shadowauth-login";
const DEFAULT_WORLD_ID_VERIFY_URL: &str = "https://developer.worldcoin.org";
const DEFAULT_VERIFIER_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SESSION_MAX_USAGE: u32 = 100;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    world_id_app_id: String,
    world_id_action: String,
    world_id_verify_url: String,
    verifier_timeout_seconds: u64,
    session_ttl_seconds: i64,
    session_max_usage: u32,
    session_permissions: Vec<String>,
    rate_limits: RateLimitPolicy,
    admin_token: Option<SecretString>,
    require_registered_app: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(world_id_app_id: String) -> Self {
        Self {
            world_id_app_id,
            world_id_action: DEFAULT_WORLD_ID_ACTION.to_string(),
            world_id_verify_url: DEFAULT_WORLD_ID_VERIFY_URL.to_string(),
            verifier_timeout_seconds: DEFAULT_VERIFIER_TIMEOUT_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_max_usage: DEFAULT_SESSION_MAX_USAGE,
            session_permissions: vec!["read".to_string(), "write".to_string()],
            rate_limits: RateLimitPolicy::default(),
            admin_token: None,
            require_registered_app: false,
        }
    }

    #[must_use]
    pub fn with_world_id_action(mut self, action: String) -> Self {
        self.world_id_action = action;
        self
    }

    #[must_use]
    pub fn with_world_id_verify_url(mut self, url: String) -> Self {
        self.world_id_verify_url = url;
        self
    }

    #[must_use]
    pub fn with_verifier_timeout_seconds(mut self, seconds: u64) -> Self {
        self.verifier_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_max_usage(mut self, max_usage: u32) -> Self {
        self.session_max_usage = max_usage;
        self
    }

    #[must_use]
    pub fn with_session_permissions(mut self, permissions: Vec<String>) -> Self {
        self.session_permissions = permissions;
        self
    }

    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: RateLimitPolicy) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    #[must_use]
    pub fn with_admin_token(mut self, token: Option<SecretString>) -> Self {
        // An empty token would make every bearer header with an empty value an admin.
        self.admin_token = token.filter(|token| !token.expose_secret().is_empty());
        self
    }

    #[must_use]
    pub fn with_require_registered_app(mut self, require: bool) -> Self {
        self.require_registered_app = require;
        self
    }

    #[must_use]
    pub fn world_id_app_id(&self) -> &str {
        &self.world_id_app_id
    }

    #[must_use]
    pub fn world_id_action(&self) -> &str {
        &self.world_id_action
    }

    #[must_use]
    pub fn world_id_verify_url(&self) -> &str {
        &self.world_id_verify_url
    }

    #[must_use]
    pub fn verifier_timeout_seconds(&self) -> u64 {
        self.verifier_timeout_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_max_usage(&self) -> u32 {
        self.session_max_usage
    }

    #[must_use]
    pub fn session_permissions(&self) -> &[String] {
        &self.session_permissions
    }

    #[must_use]
    pub fn rate_limits(&self) -> &RateLimitPolicy {
        &self.rate_limits
    }

    #[must_use]
    pub fn require_registered_app(&self) -> bool {
        self.require_registered_app
    }

    pub(crate) fn admin_token(&self) -> Option<&SecretString> {
        self.admin_token.as_ref()
    }

    #[must_use]
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::new(self.world_id_app_id.clone())
            .with_ttl(ChronoDuration::seconds(self.session_ttl_seconds))
            .with_max_usage(self.session_max_usage)
            .with_permissions(self.session_permissions.clone())
            .with_verifier_timeout(Duration::from_secs(self.verifier_timeout_seconds))
            .with_require_registered_app(self.require_registered_app)
    }
}

pub struct AuthState {
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    service: SessionService,
    started_at: DateTime<Utc>,
}

impl AuthState {
    /// Wire the in-memory stores around `verifier`.
    #[must_use]
    pub fn new(config: AuthConfig, verifier: Arc<dyn ProofVerifier>, clock: Arc<dyn Clock>) -> Self {
        let limiter = Arc::new(FixedWindowRateLimiter::new(
            clock.clone(),
            config.rate_limits.clone(),
        ));
        let store = Arc::new(SessionStore::new(clock.clone()));
        let nullifiers = Arc::new(InMemoryNullifierRegistry::new(clock.clone()));
        let apps = Arc::new(AppRegistry::new(clock.clone()));
        let service = SessionService::new(
            clock.clone(),
            limiter,
            store,
            verifier,
            nullifiers,
            apps,
            config.session_policy(),
        );
        let started_at = clock.now();

        Self {
            config,
            clock,
            service,
            started_at,
        }
    }

    /// Production wiring: World ID developer portal and the system clock.
    ///
    /// # Errors
    /// Returns an error if the verify URL is invalid or the HTTP client cannot be built.
    pub fn from_config(config: AuthConfig) -> Result<Self> {
        let verifier = WorldIdVerifier::new(
            config.world_id_verify_url(),
            config.world_id_app_id(),
            config.world_id_action().to_string(),
        )
        .context("Failed to build World ID verifier")?;
        Ok(Self::new(config, Arc::new(verifier), Arc::new(SystemClock)))
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn service(&self) -> &SessionService {
        &self.service
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{RateLimitAction, RateLimitQuota};

    #[test]
    fn defaults_follow_session_policy() {
        let config = AuthConfig::new("app_test".to_string());
        let policy = config.session_policy();
        assert_eq!(policy.app_id(), "app_test");
        assert_eq!(policy.ttl(), ChronoDuration::hours(24));
        assert_eq!(policy.max_usage(), 100);
        assert_eq!(policy.permissions(), ["read", "write"]);
        assert_eq!(policy.verifier_timeout(), Duration::from_secs(5));
        assert!(!policy.require_registered_app());
        assert_eq!(config.world_id_action(), "shadowauth-login");
    }

    #[test]
    fn builder_overrides_apply() {
        let config = AuthConfig::new("app_test".to_string())
            .with_session_ttl_seconds(60)
            .with_session_max_usage(2)
            .with_session_permissions(vec!["read".to_string()])
            .with_verifier_timeout_seconds(1)
            .with_require_registered_app(true)
            .with_rate_limits(
                RateLimitPolicy::default()
                    .with_quota(RateLimitAction::Login, RateLimitQuota::new(1, 10)),
            );
        let policy = config.session_policy();
        assert_eq!(policy.ttl(), ChronoDuration::seconds(60));
        assert_eq!(policy.max_usage(), 2);
        assert_eq!(policy.permissions(), ["read"]);
        assert!(policy.require_registered_app());
        assert_eq!(
            config.rate_limits().quota(RateLimitAction::Login),
            RateLimitQuota::new(1, 10)
        );
    }

    #[test]
    fn empty_admin_token_disables_admin_routes() {
        let config =
            AuthConfig::new("app_test".to_string()).with_admin_token(Some(SecretString::from("")));
        assert!(config.admin_token().is_none());

        let config = AuthConfig::new("app_test".to_string())
            .with_admin_token(Some(SecretString::from("s3cret")));
        assert_eq!(
            config.admin_token().map(|token| token.expose_secret()),
            Some("s3cret")
        );
    }

    #[test]
    fn from_config_rejects_bad_verify_url() {
        let config =
            AuthConfig::new("app_test".to_string()).with_world_id_verify_url("not a url".to_string());
        assert!(AuthState::from_config(config).is_err());
    }
}
