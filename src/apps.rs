//! Registered third-party applications.
//!
//! Same storage shape as the session store: one map behind one lock. New
//! registrations start `pending` and move through approval by an operator.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::sync::Mutex;
use url::Url;
use utoipa::ToSchema;

use crate::clock::Clock;

const APP_ID_BYTES: usize = 16;
pub const ALLOWED_PERMISSIONS: [&str; 4] = ["read", "write", "admin", "delete"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
        };
        f.write_str(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppRegistration {
    pub app_id: String,
    pub app_name: String,
    pub app_url: String,
    pub description: String,
    pub contact_email: String,
    pub redirect_urls: Vec<String>,
    pub permissions: Vec<String>,
    pub status: AppStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Unvalidated registration input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewApp {
    pub app_name: String,
    pub app_url: String,
    pub description: String,
    pub contact_email: String,
    pub redirect_urls: Vec<String>,
    pub permissions: Option<Vec<String>>,
}

impl NewApp {
    /// Check required fields and formats, returning trimmed input with
    /// default permissions applied.
    ///
    /// # Errors
    /// Returns `RegistryError::Validation` describing the first invalid field.
    pub fn validate(self) -> Result<Self, RegistryError> {
        let app_name = self.app_name.trim().to_string();
        let app_url = self.app_url.trim().to_string();
        let contact_email = self.contact_email.trim().to_string();

        if app_name.is_empty() || app_url.is_empty() || contact_email.is_empty() {
            return Err(RegistryError::Validation(
                "Missing required fields: appName, appUrl, contactEmail".to_string(),
            ));
        }
        if !valid_email(&contact_email) {
            return Err(RegistryError::Validation("Invalid email format".to_string()));
        }
        if Url::parse(&app_url).is_err() {
            return Err(RegistryError::Validation(
                "Invalid app URL format".to_string(),
            ));
        }
        if self
            .redirect_urls
            .iter()
            .any(|redirect| Url::parse(redirect).is_err())
        {
            return Err(RegistryError::Validation(
                "Invalid redirect URL format".to_string(),
            ));
        }

        let permissions = self
            .permissions
            .unwrap_or_else(|| vec!["read".to_string(), "write".to_string()]);
        if !valid_permissions(&permissions) {
            return Err(RegistryError::Validation(format!(
                "Invalid permissions, allowed: {}",
                ALLOWED_PERMISSIONS.join(", ")
            )));
        }

        Ok(Self {
            app_name,
            app_url,
            description: self.description.trim().to_string(),
            contact_email,
            redirect_urls: self.redirect_urls,
            permissions: Some(permissions),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("application not found")]
    NotFound,
    #[error("failed to generate app id")]
    IdGeneration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct AppStats {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub suspended: usize,
}

/// Create a new application id: `app_` followed by 32 lowercase hex characters.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn generate_app_id() -> Result<String> {
    let mut bytes = [0u8; APP_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate app id")?;
    Ok(format!("app_{}", hex::encode(bytes)))
}

#[must_use]
pub fn is_valid_app_id(app_id: &str) -> bool {
    Regex::new(r"^app_[a-f0-9]{32}$").is_ok_and(|re| re.is_match(app_id))
}

/// Lightweight email sanity check.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[must_use]
pub fn valid_permissions(permissions: &[String]) -> bool {
    permissions
        .iter()
        .all(|permission| ALLOWED_PERMISSIONS.contains(&permission.as_str()))
}

pub struct AppRegistry {
    clock: Arc<dyn Clock>,
    apps: Mutex<HashMap<String, AppRegistration>>,
}

impl AppRegistry {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            apps: Mutex::new(HashMap::new()),
        }
    }

    /// Validate and store a new `pending` registration under a fresh id.
    ///
    /// # Errors
    /// Returns `RegistryError::Validation` for bad input.
    pub async fn register(&self, new_app: NewApp) -> Result<AppRegistration, RegistryError> {
        let new_app = new_app.validate()?;
        let now = self.clock.now();

        let mut apps = self.apps.lock().await;
        // 128 random bits; a collision means the RNG is broken, so just draw again.
        let app_id = loop {
            let candidate = generate_app_id().map_err(|_| RegistryError::IdGeneration)?;
            if !apps.contains_key(&candidate) {
                break candidate;
            }
        };

        let registration = AppRegistration {
            app_id: app_id.clone(),
            app_name: new_app.app_name,
            app_url: new_app.app_url,
            description: new_app.description,
            contact_email: new_app.contact_email,
            redirect_urls: new_app.redirect_urls,
            permissions: new_app.permissions.unwrap_or_default(),
            status: AppStatus::Pending,
            created_at: now,
            updated_at: now,
            approved_at: None,
            approved_by: None,
            rejection_reason: None,
        };
        apps.insert(app_id, registration.clone());
        Ok(registration)
    }

    pub async fn get(&self, app_id: &str) -> Option<AppRegistration> {
        self.apps.lock().await.get(app_id).cloned()
    }

    pub async fn exists(&self, app_id: &str) -> bool {
        self.apps.lock().await.contains_key(app_id)
    }

    pub async fn is_approved(&self, app_id: &str) -> bool {
        self.apps
            .lock()
            .await
            .get(app_id)
            .is_some_and(|app| app.status == AppStatus::Approved)
    }

    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown ids.
    pub async fn approve(
        &self,
        app_id: &str,
        approved_by: &str,
    ) -> Result<AppRegistration, RegistryError> {
        self.update(app_id, |app, now| {
            app.status = AppStatus::Approved;
            app.approved_at = Some(now);
            app.approved_by = Some(approved_by.to_string());
            app.rejection_reason = None;
        })
        .await
    }

    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown ids.
    pub async fn reject(&self, app_id: &str, reason: &str) -> Result<AppRegistration, RegistryError> {
        self.update(app_id, |app, _| {
            app.status = AppStatus::Rejected;
            app.rejection_reason = Some(reason.to_string());
        })
        .await
    }

    /// # Errors
    /// Returns `RegistryError::NotFound` for unknown ids.
    pub async fn suspend(&self, app_id: &str, reason: &str) -> Result<AppRegistration, RegistryError> {
        self.update(app_id, |app, _| {
            app.status = AppStatus::Suspended;
            app.rejection_reason = Some(reason.to_string());
        })
        .await
    }

    async fn update<F>(&self, app_id: &str, apply: F) -> Result<AppRegistration, RegistryError>
    where
        F: FnOnce(&mut AppRegistration, DateTime<Utc>),
    {
        let now = self.clock.now();
        let mut apps = self.apps.lock().await;
        let app = apps.get_mut(app_id).ok_or(RegistryError::NotFound)?;
        apply(app, now);
        app.updated_at = now;
        Ok(app.clone())
    }

    /// All registrations, optionally filtered by status, oldest first.
    pub async fn list(&self, status: Option<AppStatus>) -> Vec<AppRegistration> {
        let apps = self.apps.lock().await;
        let mut matching: Vec<AppRegistration> = apps
            .values()
            .filter(|app| status.is_none_or(|status| app.status == status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.app_id.cmp(&b.app_id)));
        matching
    }

    /// Case-insensitive match on name, description, or contact email.
    pub async fn search(&self, query: &str) -> Vec<AppRegistration> {
        let needle = query.to_lowercase();
        self.list(None)
            .await
            .into_iter()
            .filter(|app| {
                app.app_name.to_lowercase().contains(&needle)
                    || app.description.to_lowercase().contains(&needle)
                    || app.contact_email.to_lowercase().contains(&needle)
            })
            .collect()
    }

    pub async fn delete(&self, app_id: &str) -> bool {
        self.apps.lock().await.remove(app_id).is_some()
    }

    pub async fn stats(&self) -> AppStats {
        let apps = self.apps.lock().await;
        let mut stats = AppStats {
            total: apps.len(),
            ..AppStats::default()
        };
        for app in apps.values() {
            match app.status {
                AppStatus::Pending => stats.pending += 1,
                AppStatus::Approved => stats.approved += 1,
                AppStatus::Rejected => stats.rejected += 1,
                AppStatus::Suspended => stats.suspended += 1,
            }
        }
        stats
    }
}
