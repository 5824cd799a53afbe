//! Fixed-window request counters keyed by caller identity and action.
//!
//! Each `(identifier, action)` pair owns one counter and one window end. The
//! counter resets only when a check observes that the window has elapsed, so
//! a caller can spend a full quota just before a boundary and another full
//! quota right after it. That burst is part of the contract; this is not a
//! sliding window.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};
use tokio::sync::Mutex;

const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    Verify,
    Revoke,
    Register,
    Admin,
    Default,
}

impl RateLimitAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Verify => "verify",
            Self::Revoke => "revoke",
            Self::Register => "register",
            Self::Admin => "admin",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitQuota {
    max_requests: u32,
    window_seconds: u64,
}

impl RateLimitQuota {
    #[must_use]
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    #[must_use]
    pub const fn max_requests(&self) -> u32 {
        self.max_requests
    }

    #[must_use]
    pub const fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    fn window(&self) -> Duration {
        let seconds = self.window_seconds.min(MAX_WINDOW_SECONDS);
        Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX / 1_000))
    }
}

/// Parses `MAX/SECONDS`, e.g. `5/60`.
impl FromStr for RateLimitQuota {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (max, window) = value
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("invalid quota '{value}', expected MAX/SECONDS"))?;
        let max_requests = max
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid max requests in '{value}'"))?;
        let window_seconds = window
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid window seconds in '{value}'"))?;
        if max_requests == 0 {
            return Err("max requests must be greater than zero".to_string());
        }
        if window_seconds == 0 || window_seconds > MAX_WINDOW_SECONDS {
            return Err(format!(
                "window seconds must be between 1 and {MAX_WINDOW_SECONDS}"
            ));
        }
        Ok(Self::new(max_requests, window_seconds))
    }
}

impl fmt::Display for RateLimitQuota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.max_requests, self.window_seconds)
    }
}

/// Per-action quotas. Actions without an explicit quota use `default`.
#[derive(Clone, Debug)]
pub struct RateLimitPolicy {
    quotas: HashMap<RateLimitAction, RateLimitQuota>,
    default: RateLimitQuota,
}

impl RateLimitPolicy {
    #[must_use]
    pub fn new(default: RateLimitQuota) -> Self {
        Self {
            quotas: HashMap::new(),
            default,
        }
    }

    #[must_use]
    pub fn with_quota(mut self, action: RateLimitAction, quota: RateLimitQuota) -> Self {
        if action == RateLimitAction::Default {
            self.default = quota;
        } else {
            self.quotas.insert(action, quota);
        }
        self
    }

    #[must_use]
    pub fn quota(&self, action: RateLimitAction) -> RateLimitQuota {
        self.quotas.get(&action).copied().unwrap_or(self.default)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::new(RateLimitQuota::new(50, 60))
            .with_quota(RateLimitAction::Login, RateLimitQuota::new(5, 60))
            .with_quota(RateLimitAction::Verify, RateLimitQuota::new(100, 60))
            .with_quota(RateLimitAction::Revoke, RateLimitQuota::new(10, 60))
            .with_quota(RateLimitAction::Register, RateLimitQuota::new(3, 300))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub decision: RateLimitDecision,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.decision == RateLimitDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_end: DateTime<Utc>,
}

pub struct FixedWindowRateLimiter {
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: RateLimitPolicy) -> Self {
        Self {
            clock,
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Count one request against the configured quota for `action`.
    pub async fn check_action(&self, identifier: &str, action: RateLimitAction) -> RateLimitStatus {
        let quota = self.policy.quota(action);
        self.check(identifier, action.as_str(), quota).await
    }

    /// Count one request against an explicit quota.
    ///
    /// A denied request leaves the stored entry untouched.
    pub async fn check(&self, identifier: &str, action: &str, quota: RateLimitQuota) -> RateLimitStatus {
        let key = entry_key(identifier, action);
        let now = self.clock.now();
        let max_requests = quota.max_requests();

        let mut entries = self.entries.lock().await;
        match entries.get_mut(&key) {
            Some(entry) if entry.window_end > now => {
                if entry.count >= max_requests {
                    return RateLimitStatus {
                        decision: RateLimitDecision::Limited,
                        remaining: 0,
                        reset_at: entry.window_end,
                    };
                }
                entry.count += 1;
                RateLimitStatus {
                    decision: RateLimitDecision::Allowed,
                    remaining: max_requests.saturating_sub(entry.count),
                    reset_at: entry.window_end,
                }
            }
            _ => {
                let window_end = now + quota.window();
                entries.insert(
                    key,
                    RateLimitEntry {
                        count: 1,
                        window_end,
                    },
                );
                RateLimitStatus {
                    decision: RateLimitDecision::Allowed,
                    remaining: max_requests.saturating_sub(1),
                    reset_at: window_end,
                }
            }
        }
    }

    /// Drop entries whose window has elapsed. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.window_end > now);
        before - entries.len()
    }

    pub async fn inspect(&self, identifier: &str, action: &str) -> Option<RateLimitEntry> {
        let entries = self.entries.lock().await;
        entries.get(&entry_key(identifier, action)).copied()
    }

    pub async fn reset(&self, identifier: &str, action: &str) -> bool {
        let mut entries = self.entries.lock().await;
        entries.remove(&entry_key(identifier, action)).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

fn entry_key(identifier: &str, action: &str) -> String {
    format!("{identifier}:{action}")
}
