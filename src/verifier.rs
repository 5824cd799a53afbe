//! External collaborators consulted by the login flow.
//!
//! - [`ProofVerifier`] checks a World ID proof against the developer portal.
//! - [`NullifierRegistry`] remembers which nullifiers back a live session so
//!   one proof cannot mint two sessions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::{clock::Clock, redact::redact, APP_USER_AGENT};

const VERIFY_PATH: &str = "api/v2/verify";
const HTTP_TIMEOUT_SECONDS: u64 = 10;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    #[default]
    Orb,
    Device,
}

impl CredentialType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Orb => "orb",
            Self::Device => "device",
        }
    }
}

/// `phone` is the legacy name of the `device` credential.
impl FromStr for CredentialType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "orb" => Ok(Self::Orb),
            "device" | "phone" => Ok(Self::Device),
            other => Err(format!("Unsupported credential type: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct ProofRequest {
    pub proof: String,
    pub nullifier_hash: String,
    pub merkle_root: String,
    pub credential_type: CredentialType,
}

impl fmt::Debug for ProofRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProofRequest")
            .field("proof", &"***")
            .field("nullifier_hash", &redact(&self.nullifier_hash))
            .field("merkle_root", &redact(&self.merkle_root))
            .field("credential_type", &self.credential_type)
            .finish()
    }
}

/// A verifier refusal, naming the offending field when one is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofRejection {
    pub field: Option<String>,
    pub reason: String,
}

impl ProofRejection {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            field: None,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn for_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProofRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("proof rejected: {0}")]
    Rejected(ProofRejection),
    #[error("verifier unavailable")]
    Unavailable(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Last call reached the verifier.
    Ok,
    /// Last call failed to reach the verifier.
    Error,
    /// No call has been made yet.
    Unknown,
}

impl DependencyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        !matches!(self, Self::Error)
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Ok => 1,
            Self::Error => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ok,
            2 => Self::Error,
            _ => Self::Unknown,
        }
    }
}

#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Accept or reject a proof. Implementations may perform network I/O;
    /// callers bound the call with a timeout.
    async fn verify(&self, request: &ProofRequest) -> Result<(), VerifyError>;

    fn dependency_status(&self) -> DependencyStatus {
        DependencyStatus::Unknown
    }
}

#[derive(Serialize)]
struct PortalVerifyRequest<'a> {
    nullifier_hash: &'a str,
    merkle_root: &'a str,
    proof: &'a str,
    verification_level: &'a str,
    action: &'a str,
}

#[derive(Deserialize, Default)]
struct PortalErrorResponse {
    code: Option<String>,
    detail: Option<String>,
    attribute: Option<String>,
}

/// Proof verifier backed by the World ID developer portal.
#[derive(Debug)]
pub struct WorldIdVerifier {
    client: Client,
    endpoint: Url,
    action: String,
    status: AtomicU8,
}

impl WorldIdVerifier {
    /// # Errors
    /// Returns an error if the endpoint cannot be built or the HTTP client fails to initialize.
    pub fn new(base_url: &str, app_id: &str, action: String) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid World ID verify URL: {base_url}"))?;
        let endpoint = base
            .join(&format!(
                "{}/{VERIFY_PATH}/{app_id}",
                base.path().trim_end_matches('/')
            ))
            .with_context(|| format!("Invalid World ID app id: {app_id}"))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .build()
            .context("Error creating reqwest client")?;

        Ok(Self {
            client,
            endpoint,
            action,
            status: AtomicU8::new(DependencyStatus::Unknown.to_u8()),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn record(&self, status: DependencyStatus) {
        self.status.store(status.to_u8(), Ordering::Relaxed);
    }
}

#[async_trait]
impl ProofVerifier for WorldIdVerifier {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn verify(&self, request: &ProofRequest) -> Result<(), VerifyError> {
        validate_hex_field("merkleRoot", &request.merkle_root).map_err(VerifyError::Rejected)?;
        validate_hex_field("nullifierHash", &request.nullifier_hash)
            .map_err(VerifyError::Rejected)?;
        validate_hex_field("proof", &request.proof).map_err(VerifyError::Rejected)?;

        let body = PortalVerifyRequest {
            nullifier_hash: &request.nullifier_hash,
            merkle_root: &request.merkle_root,
            proof: &request.proof,
            verification_level: request.credential_type.as_str(),
            action: &self.action,
        };

        let response = match self.client.post(self.endpoint.clone()).json(&body).send().await {
            Ok(response) => response,
            Err(err) => {
                error!("Error calling World ID verifier: {err}");
                self.record(DependencyStatus::Error);
                return Err(VerifyError::Unavailable(err.into()));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            error!("World ID verifier returned {status}");
            self.record(DependencyStatus::Error);
            return Err(VerifyError::Unavailable(anyhow::anyhow!(
                "verifier returned {status}"
            )));
        }
        self.record(DependencyStatus::Ok);

        if status.is_success() {
            debug!("World ID proof accepted");
            return Ok(());
        }

        let detail = response
            .json::<PortalErrorResponse>()
            .await
            .unwrap_or_default();
        let reason = detail
            .detail
            .or(detail.code)
            .unwrap_or_else(|| format!("verification failed with status {status}"));
        warn!("World ID proof rejected: {reason}");
        Err(VerifyError::Rejected(ProofRejection {
            field: detail.attribute,
            reason,
        }))
    }

    fn dependency_status(&self) -> DependencyStatus {
        DependencyStatus::from_u8(self.status.load(Ordering::Relaxed))
    }
}

/// Proof fields are `0x`-prefixed hex strings.
fn validate_hex_field(field: &str, value: &str) -> Result<(), ProofRejection> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProofRejection::for_field(field, "must be a hex string"));
    }
    Ok(())
}

#[async_trait]
pub trait NullifierRegistry: Send + Sync {
    /// Whether the nullifier currently backs a live session.
    async fn is_used(&self, nullifier_hash: &str) -> Result<bool>;

    /// Atomically bind a nullifier to a session. Returns false if it is
    /// already bound to another live session.
    async fn claim(
        &self,
        nullifier_hash: &str,
        session_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Drop the binding, but only if it still points at `session_key`.
    async fn release(&self, nullifier_hash: &str, session_key: &str) -> Result<()>;
}

struct NullifierBinding {
    session_key: String,
    expires_at: DateTime<Utc>,
}

/// Process-local nullifier bindings. Expired bindings count as free.
pub struct InMemoryNullifierRegistry {
    clock: Arc<dyn Clock>,
    bindings: Mutex<HashMap<String, NullifierBinding>>,
}

impl InMemoryNullifierRegistry {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.bindings.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bindings.lock().await.is_empty()
    }
}

#[async_trait]
impl NullifierRegistry for InMemoryNullifierRegistry {
    async fn is_used(&self, nullifier_hash: &str) -> Result<bool> {
        let now = self.clock.now();
        let bindings = self.bindings.lock().await;
        Ok(bindings
            .get(nullifier_hash)
            .is_some_and(|binding| binding.expires_at > now))
    }

    async fn claim(
        &self,
        nullifier_hash: &str,
        session_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let now = self.clock.now();
        let mut bindings = self.bindings.lock().await;
        if bindings
            .get(nullifier_hash)
            .is_some_and(|binding| binding.expires_at > now)
        {
            return Ok(false);
        }
        bindings.insert(
            nullifier_hash.to_string(),
            NullifierBinding {
                session_key: session_key.to_string(),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn release(&self, nullifier_hash: &str, session_key: &str) -> Result<()> {
        let mut bindings = self.bindings.lock().await;
        if bindings
            .get(nullifier_hash)
            .is_some_and(|binding| binding.session_key == session_key)
        {
            bindings.remove(nullifier_hash);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use chrono::Duration as ChronoDuration;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    fn proof_request() -> ProofRequest {
        ProofRequest {
            proof: "0xabcdef".to_string(),
            nullifier_hash: "0x1234".to_string(),
            merkle_root: "0x5678".to_string(),
            credential_type: CredentialType::Orb,
        }
    }

    async fn fake_portal() -> anyhow::Result<String> {
        async fn verify(Path(app_id): Path<String>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if app_id != "app_staging_test" {
                return (StatusCode::NOT_FOUND, Json(json!({"code": "not_found"})));
            }
            match body.get("nullifier_hash").and_then(Value::as_str) {
                Some("0x1234") => (StatusCode::OK, Json(json!({"success": true}))),
                Some("0xdead") => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"code": "server_error"})),
                ),
                _ => (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "code": "invalid_proof",
                        "detail": "The provided proof is invalid",
                        "attribute": "proof"
                    })),
                ),
            }
        }

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = Router::new().route("/api/v2/verify/:app_id", post(verify));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(format!("http://{addr}"))
    }

    #[test]
    fn credential_type_parses_aliases() {
        assert_eq!("orb".parse::<CredentialType>(), Ok(CredentialType::Orb));
        assert_eq!("Device".parse::<CredentialType>(), Ok(CredentialType::Device));
        assert_eq!("phone".parse::<CredentialType>(), Ok(CredentialType::Device));
        assert!("passport".parse::<CredentialType>().is_err());
    }

    #[test]
    fn endpoint_includes_app_id() -> anyhow::Result<()> {
        let verifier = WorldIdVerifier::new(
            "https://developer.worldcoin.org",
            "app_123",
            "login".to_string(),
        )?;
        assert_eq!(
            verifier.endpoint().as_str(),
            "https://developer.worldcoin.org/api/v2/verify/app_123"
        );
        assert_eq!(verifier.dependency_status(), DependencyStatus::Unknown);
        Ok(())
    }

    #[test]
    fn proof_request_debug_hides_proof() {
        let rendered = format!("{:?}", proof_request());
        assert!(!rendered.contains("0xabcdef"));
    }

    #[tokio::test]
    async fn malformed_fields_are_rejected_by_name() -> anyhow::Result<()> {
        let verifier =
            WorldIdVerifier::new("http://127.0.0.1:9", "app_staging_test", "login".to_string())?;
        let mut request = proof_request();
        request.merkle_root = "not-hex".to_string();
        match verifier.verify(&request).await {
            Err(VerifyError::Rejected(rejection)) => {
                assert_eq!(rejection.field.as_deref(), Some("merkleRoot"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn portal_accepts_valid_proof() -> anyhow::Result<()> {
        let base = fake_portal().await?;
        let verifier = WorldIdVerifier::new(&base, "app_staging_test", "login".to_string())?;
        assert!(verifier.verify(&proof_request()).await.is_ok());
        assert_eq!(verifier.dependency_status(), DependencyStatus::Ok);
        Ok(())
    }

    #[tokio::test]
    async fn portal_rejection_names_attribute() -> anyhow::Result<()> {
        let base = fake_portal().await?;
        let verifier = WorldIdVerifier::new(&base, "app_staging_test", "login".to_string())?;
        let mut request = proof_request();
        request.nullifier_hash = "0xbeef".to_string();
        match verifier.verify(&request).await {
            Err(VerifyError::Rejected(rejection)) => {
                assert_eq!(rejection.field.as_deref(), Some("proof"));
                assert_eq!(rejection.reason, "The provided proof is invalid");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn portal_server_error_marks_dependency_unhealthy() -> anyhow::Result<()> {
        let base = fake_portal().await?;
        let verifier = WorldIdVerifier::new(&base, "app_staging_test", "login".to_string())?;
        let mut request = proof_request();
        request.nullifier_hash = "0xdead".to_string();
        assert!(matches!(
            verifier.verify(&request).await,
            Err(VerifyError::Unavailable(_))
        ));
        assert_eq!(verifier.dependency_status(), DependencyStatus::Error);
        assert!(!verifier.dependency_status().is_healthy());
        Ok(())
    }

    #[tokio::test]
    async fn nullifier_claim_is_exclusive_until_released() -> anyhow::Result<()> {
        let clock = Arc::new(ManualClock::default());
        let registry = InMemoryNullifierRegistry::new(clock.clone());
        let expires_at = clock.now() + ChronoDuration::hours(1);

        assert!(!registry.is_used("0xn").await?);
        assert!(registry.claim("0xn", "session-a", expires_at).await?);
        assert!(registry.is_used("0xn").await?);
        assert!(!registry.claim("0xn", "session-b", expires_at).await?);

        // Only the owning session can release the binding.
        registry.release("0xn", "session-b").await?;
        assert!(registry.is_used("0xn").await?);
        registry.release("0xn", "session-a").await?;
        assert!(!registry.is_used("0xn").await?);
        Ok(())
    }

    #[tokio::test]
    async fn expired_bindings_are_free() -> anyhow::Result<()> {
        let clock = Arc::new(ManualClock::default());
        let registry = InMemoryNullifierRegistry::new(clock.clone());
        registry
            .claim("0xn", "session-a", clock.now() + ChronoDuration::minutes(5))
            .await?;
        clock.advance(ChronoDuration::minutes(5));
        assert!(!registry.is_used("0xn").await?);
        assert!(
            registry
                .claim("0xn", "session-b", clock.now() + ChronoDuration::minutes(5))
                .await?
        );
        Ok(())
    }
}
