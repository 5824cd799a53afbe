//! Health probe for shadowauth.
//!
//! Reports in-memory store sizes and the last observed verifier status. No
//! network call is made on a probe; the verifier status reflects the most
//! recent login.

use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use super::auth::AuthState;
use crate::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Debug)]
pub struct ComponentHealth {
    healthy: bool,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<usize>,
}

impl ComponentHealth {
    fn store(entries: usize) -> Self {
        Self {
            healthy: true,
            status: "ok".to_string(),
            entries: Some(entries),
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    sessions: ComponentHealth,
    rate_limiter: ComponentHealth,
    apps: ComponentHealth,
    verifier: ComponentHealth,
}

impl HealthChecks {
    fn healthy(&self) -> bool {
        self.sessions.healthy && self.rate_limiter.healthy && self.apps.healthy && self.verifier.healthy
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    status: String,
    commit: String,
    name: String,
    version: String,
    timestamp: DateTime<Utc>,
    uptime_seconds: i64,
    checks: HealthChecks,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = Health),
        (status = 503, description = "A dependency is unhealthy", body = Health)
    ),
    tag = "health",
)]
// axum handler for health
pub async fn health(method: Method, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let service = auth_state.service();
    let verifier_status = service.verifier().dependency_status();

    let checks = HealthChecks {
        sessions: ComponentHealth::store(service.store().len().await),
        rate_limiter: ComponentHealth::store(service.limiter().len().await),
        apps: ComponentHealth::store(service.apps().stats().await.total),
        verifier: ComponentHealth {
            healthy: verifier_status.is_healthy(),
            status: verifier_status.as_str().to_string(),
            entries: None,
        },
    };
    let healthy = checks.healthy();

    let now = auth_state.now();
    let health = Health {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now,
        uptime_seconds: (now - auth_state.started_at()).num_seconds().max(0),
        checks,
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    if healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
