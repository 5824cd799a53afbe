//! In-process session storage.
//!
//! All read-modify-write sequences run under one store-wide lock. Contention
//! is low and every critical section is a single map operation.

use chrono::{DateTime, Utc};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::Mutex;

use super::error::{SessionRejection, StoreError};
use crate::{clock::Clock, redact::redact};

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub session_key: String,
    pub nullifier_hash: String,
    pub app_id: String,
    pub expires_at: DateTime<Utc>,
    pub max_usage: u32,
    pub usage_count: u32,
    pub permissions: Vec<String>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Revocation first, then expiry (at or after `expires_at`), then quota.
    fn rejection(&self, now: DateTime<Utc>) -> Option<SessionRejection> {
        if self.is_revoked {
            Some(SessionRejection::Revoked)
        } else if self.expires_at <= now {
            Some(SessionRejection::Expired)
        } else if self.usage_count >= self.max_usage {
            Some(SessionRejection::QuotaExceeded)
        } else {
            None
        }
    }

    /// Every requested permission must be held. An empty request always passes.
    #[must_use]
    pub fn grants(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|permission| self.permissions.contains(permission))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_key", &redact(&self.session_key))
            .field("nullifier_hash", &redact(&self.nullifier_hash))
            .field("app_id", &self.app_id)
            .field("expires_at", &self.expires_at)
            .field("max_usage", &self.max_usage)
            .field("usage_count", &self.usage_count)
            .field("permissions", &self.permissions)
            .field("is_revoked", &self.is_revoked)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Non-sensitive projection of a session. Never carries the key or nullifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub expires_at: DateTime<Utc>,
    pub max_usage: u32,
    pub usage_count: u32,
    pub permissions: Vec<String>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            expires_at: session.expires_at,
            max_usage: session.max_usage,
            usage_count: session.usage_count,
            permissions: session.permissions.clone(),
            is_revoked: session.is_revoked,
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct CreateSessionParams {
    pub session_key: String,
    pub nullifier_hash: String,
    pub app_id: String,
    pub expires_at: DateTime<Utc>,
    pub max_usage: u32,
    pub permissions: Vec<String>,
}

pub struct SessionStore {
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a fresh session.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateKey` if the key is already stored. The
    /// existing record is left untouched.
    pub async fn create(&self, params: CreateSessionParams) -> Result<Session, StoreError> {
        let now = self.clock.now();
        let mut permissions: Vec<String> = Vec::with_capacity(params.permissions.len());
        for permission in params.permissions {
            if !permissions.contains(&permission) {
                permissions.push(permission);
            }
        }

        let session = Session {
            session_key: params.session_key,
            nullifier_hash: params.nullifier_hash,
            app_id: params.app_id,
            expires_at: params.expires_at,
            max_usage: params.max_usage,
            usage_count: 0,
            permissions,
            is_revoked: false,
            created_at: now,
            updated_at: now,
        };

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.session_key) {
            return Err(StoreError::DuplicateKey);
        }
        sessions.insert(session.session_key.clone(), session.clone());
        Ok(session)
    }

    pub async fn get(&self, session_key: &str) -> Option<Session> {
        self.sessions.lock().await.get(session_key).cloned()
    }

    pub async fn info(&self, session_key: &str) -> Option<SessionInfo> {
        self.sessions
            .lock()
            .await
            .get(session_key)
            .map(SessionInfo::from)
    }

    /// Return the session if it is currently usable. Read-only.
    ///
    /// # Errors
    /// Returns the first failing check: not found, revoked, expired, or quota.
    pub async fn verify(&self, session_key: &str) -> Result<Session, SessionRejection> {
        let now = self.clock.now();
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(session_key)
            .ok_or(SessionRejection::NotFound)?;
        match session.rejection(now) {
            Some(rejection) => Err(rejection),
            None => Ok(session.clone()),
        }
    }

    /// Count one use. Returns the new usage count.
    ///
    /// Missing sessions are a no-op. The validity checks run again under the
    /// lock, so two racing callers can never push `usage_count` past
    /// `max_usage` or touch a revoked session; such an increment is refused
    /// and `None` is returned.
    pub async fn increment_usage(&self, session_key: &str) -> Option<u32> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(session_key)?;
        if session.rejection(now).is_some() {
            return None;
        }
        session.usage_count += 1;
        session.updated_at = now;
        Some(session.usage_count)
    }

    /// Mark a session revoked. Revoking twice is fine; unknown keys return false.
    pub async fn revoke(&self, session_key: &str) -> bool {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_key) {
            Some(session) => {
                session.is_revoked = true;
                session.updated_at = now;
                true
            }
            None => false,
        }
    }

    /// Remove expired and revoked sessions, returning the removed records.
    pub async fn drain_expired(&self) -> Vec<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        let dead: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.is_revoked || session.expires_at < now)
            .map(|(key, _)| key.clone())
            .collect();
        dead.iter()
            .filter_map(|key| sessions.remove(key))
            .collect()
    }

    pub async fn sweep_expired(&self) -> usize {
        self.drain_expired().await.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use anyhow::{Context, Result};
    use chrono::Duration;

    fn store() -> (Arc<ManualClock>, SessionStore) {
        let clock = Arc::new(ManualClock::default());
        let store = SessionStore::new(clock.clone());
        (clock, store)
    }

    fn params(clock: &ManualClock, key: &str, max_usage: u32) -> CreateSessionParams {
        CreateSessionParams {
            session_key: key.to_string(),
            nullifier_hash: format!("0xnullifier-{key}"),
            app_id: "app_0123456789abcdef0123456789abcdef".to_string(),
            expires_at: clock.now() + Duration::hours(1),
            max_usage,
            permissions: vec!["read".to_string()],
        }
    }

    #[tokio::test]
    async fn create_initialises_counters_and_timestamps() -> Result<()> {
        let (clock, store) = store();
        let session = store.create(params(&clock, "k1", 3)).await?;
        assert_eq!(session.usage_count, 0);
        assert!(!session.is_revoked);
        assert_eq!(session.created_at, clock.now());
        assert_eq!(session.updated_at, clock.now());
        assert_eq!(store.get("k1").await, Some(session));
        Ok(())
    }

    #[tokio::test]
    async fn create_rejects_duplicate_key_without_overwriting() -> Result<()> {
        let (clock, store) = store();
        store.create(params(&clock, "dup", 3)).await?;
        store.increment_usage("dup").await;

        let mut other = params(&clock, "dup", 9);
        other.nullifier_hash = "0xother".to_string();
        assert_eq!(store.create(other).await, Err(StoreError::DuplicateKey));

        let kept = store.get("dup").await.context("session missing")?;
        assert_eq!(kept.max_usage, 3);
        assert_eq!(kept.usage_count, 1);
        assert_eq!(kept.nullifier_hash, "0xnullifier-dup");
        Ok(())
    }

    #[tokio::test]
    async fn create_deduplicates_permissions() -> Result<()> {
        let (clock, store) = store();
        let mut input = params(&clock, "perm", 1);
        input.permissions = vec!["read".into(), "write".into(), "read".into()];
        let session = store.create(input).await?;
        assert_eq!(session.permissions, vec!["read".to_string(), "write".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn verify_reports_each_rejection() -> Result<()> {
        let (clock, store) = store();
        assert_eq!(store.verify("missing").await, Err(SessionRejection::NotFound));

        store.create(params(&clock, "revoked", 5)).await?;
        store.revoke("revoked").await;
        assert_eq!(store.verify("revoked").await, Err(SessionRejection::Revoked));

        let mut expired = params(&clock, "expired", 5);
        expired.expires_at = clock.now() - Duration::seconds(1);
        store.create(expired).await?;
        assert_eq!(store.verify("expired").await, Err(SessionRejection::Expired));

        store.create(params(&clock, "spent", 1)).await?;
        store.increment_usage("spent").await;
        assert_eq!(store.verify("spent").await, Err(SessionRejection::QuotaExceeded));
        Ok(())
    }

    #[tokio::test]
    async fn verify_treats_expiry_instant_as_expired() -> Result<()> {
        let (clock, store) = store();
        let input = params(&clock, "edge", 5);
        let expires_at = input.expires_at;
        store.create(input).await?;

        clock.set(expires_at - Duration::milliseconds(1));
        assert!(store.verify("edge").await.is_ok());
        clock.set(expires_at);
        assert_eq!(store.verify("edge").await, Err(SessionRejection::Expired));
        Ok(())
    }

    #[tokio::test]
    async fn revoked_wins_over_expired_and_spent() -> Result<()> {
        let (clock, store) = store();
        store.create(params(&clock, "all", 1)).await?;
        store.increment_usage("all").await;
        store.revoke("all").await;
        clock.advance(Duration::hours(2));
        assert_eq!(store.verify("all").await, Err(SessionRejection::Revoked));
        Ok(())
    }

    #[tokio::test]
    async fn verify_is_side_effect_free() -> Result<()> {
        let (clock, store) = store();
        let created = store.create(params(&clock, "ro", 2)).await?;
        clock.advance(Duration::seconds(5));
        store.verify("ro").await.map_err(|r| anyhow::anyhow!("{r}"))?;
        store.verify("ro").await.map_err(|r| anyhow::anyhow!("{r}"))?;
        assert_eq!(store.get("ro").await, Some(created));
        Ok(())
    }

    #[tokio::test]
    async fn increment_usage_counts_and_touches_updated_at() -> Result<()> {
        let (clock, store) = store();
        store.create(params(&clock, "use", 2)).await?;
        clock.advance(Duration::seconds(10));

        assert_eq!(store.increment_usage("use").await, Some(1));
        let session = store.get("use").await.context("session missing")?;
        assert_eq!(session.updated_at, clock.now());
        assert_eq!(store.increment_usage("use").await, Some(2));
        assert_eq!(store.increment_usage("use").await, None);
        assert_eq!(
            store.get("use").await.map(|session| session.usage_count),
            Some(2)
        );
        Ok(())
    }

    #[tokio::test]
    async fn increment_usage_on_missing_session_is_a_no_op() {
        let (_clock, store) = store();
        assert_eq!(store.increment_usage("ghost").await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn increment_after_revoke_is_refused() -> Result<()> {
        let (clock, store) = store();
        store.create(params(&clock, "rev", 5)).await?;
        assert!(store.revoke("rev").await);
        assert_eq!(store.increment_usage("rev").await, None);
        assert_eq!(
            store.get("rev").await.map(|session| session.usage_count),
            Some(0)
        );
        Ok(())
    }

    #[tokio::test]
    async fn revoke_is_idempotent() -> Result<()> {
        let (clock, store) = store();
        store.create(params(&clock, "twice", 5)).await?;
        assert!(store.revoke("twice").await);
        assert!(store.revoke("twice").await);
        assert!(!store.revoke("never-existed").await);
        assert_eq!(store.verify("twice").await, Err(SessionRejection::Revoked));
        assert_eq!(
            store.info("twice").await.map(|info| info.is_revoked),
            Some(true)
        );
        Ok(())
    }

    #[tokio::test]
    async fn sweep_removes_expired_and_revoked_only() -> Result<()> {
        let (clock, store) = store();
        store.create(params(&clock, "live", 5)).await?;
        store.create(params(&clock, "revoked", 5)).await?;
        let mut expired = params(&clock, "expired", 5);
        expired.expires_at = clock.now() - Duration::seconds(1);
        store.create(expired).await?;
        store.revoke("revoked").await;

        assert_eq!(store.sweep_expired().await, 2);
        assert_eq!(store.len().await, 1);
        assert!(store.get("live").await.is_some());
        assert_eq!(store.sweep_expired().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_increments_never_exceed_quota() -> Result<()> {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(SessionStore::new(clock.clone()));
        store.create(params(&clock, "race", 5)).await?;

        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment_usage("race").await
            }));
        }
        let mut succeeded = 0;
        for handle in handles {
            if handle.await?.is_some() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(
            store.get("race").await.map(|session| session.usage_count),
            Some(5)
        );
        Ok(())
    }

    #[test]
    fn debug_output_redacts_identifiers() {
        let clock = ManualClock::default();
        let now = clock.now();
        let session = Session {
            session_key: "f".repeat(64),
            nullifier_hash: "0x1234567890abcdef".to_string(),
            app_id: "app".to_string(),
            expires_at: now,
            max_usage: 1,
            usage_count: 0,
            permissions: Vec::new(),
            is_revoked: false,
            created_at: now,
            updated_at: now,
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains(&"f".repeat(64)));
        assert!(!rendered.contains("0x1234567890abcdef"));
        assert!(rendered.contains("ffffffff..."));
    }

    #[test]
    fn grants_is_a_subset_check() {
        let clock = ManualClock::default();
        let now = clock.now();
        let session = Session {
            session_key: "k".to_string(),
            nullifier_hash: "n".to_string(),
            app_id: "app".to_string(),
            expires_at: now,
            max_usage: 1,
            usage_count: 0,
            permissions: vec!["read".into(), "write".into(), "admin".into()],
            is_revoked: false,
            created_at: now,
            updated_at: now,
        };
        assert!(session.grants(&[]));
        assert!(session.grants(&["write".into(), "read".into()]));
        assert!(!session.grants(&["read".into(), "delete".into()]));
    }
}
