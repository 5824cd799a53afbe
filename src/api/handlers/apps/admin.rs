//! Operator endpoints for reviewing app registrations.
//!
//! Guarded by a static bearer token. When no token is configured the routes
//! answer 404 as if they did not exist.

use axum::{
    extract::{ConnectInfo, Extension, Path, Query},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::{ExposeSecret, SecretString};
use std::{net::SocketAddr, sync::Arc};
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use super::types::{AppListResponse, AppReasonRequest, AppResponse, ApproveAppRequest, ListAppsQuery};
use crate::{
    api::handlers::{auth::AuthState, caller_identity, error_response, ErrorResponse},
    apps::{AppRegistration, RegistryError},
    rate_limit::RateLimitAction,
};

const DEFAULT_APPROVER: &str = "admin";

fn token_matches(token: &str, expected: &SecretString) -> bool {
    bool::from(token.as_bytes().ct_eq(expected.expose_secret().as_bytes()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn authorize_admin(
    auth_state: &AuthState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<(), Response> {
    let Some(expected) = auth_state.config().admin_token() else {
        return Err(error_response(StatusCode::NOT_FOUND, "Not found"));
    };

    let caller = caller_identity(headers, peer);
    auth_state
        .service()
        .admit(&caller, RateLimitAction::Admin)
        .await
        .map_err(IntoResponse::into_response)?;

    let authorized = bearer_token(headers).is_some_and(|token| token_matches(token, expected));
    if authorized {
        Ok(())
    } else {
        warn!(caller = %caller, "Admin token rejected");
        Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

fn app_response(result: Result<AppRegistration, RegistryError>) -> Response {
    match result {
        Ok(app) => (StatusCode::OK, Json(AppResponse { success: true, app })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/auth/apps",
    params(ListAppsQuery),
    responses(
        (status = 200, description = "Registrations, oldest first", body = AppListResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Admin routes disabled", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "apps"
)]
#[instrument(skip_all)]
pub async fn list_apps(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    query: Option<Query<ListAppsQuery>>,
) -> Response {
    if let Err(response) =
        authorize_admin(&auth_state, &headers, peer.map(|ConnectInfo(addr)| addr)).await
    {
        return response;
    }
    let Some(Query(query)) = query else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid query parameters");
    };

    let registry = auth_state.service().apps();
    let mut apps = match query.q.as_deref().map(str::trim) {
        Some(needle) if !needle.is_empty() => registry.search(needle).await,
        _ => registry.list(None).await,
    };
    if let Some(status) = query.status {
        apps.retain(|app| app.status == status);
    }

    (
        StatusCode::OK,
        Json(AppListResponse {
            success: true,
            apps,
            stats: registry.stats().await,
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/auth/apps/{app_id}",
    params(("app_id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "Registration", body = AppResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Unknown app or admin routes disabled", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "apps"
)]
#[instrument(skip_all, fields(app_id = %app_id))]
pub async fn get_app(
    Path(app_id): Path<String>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(response) =
        authorize_admin(&auth_state, &headers, peer.map(|ConnectInfo(addr)| addr)).await
    {
        return response;
    }
    let result = auth_state
        .service()
        .apps()
        .get(&app_id)
        .await
        .ok_or(RegistryError::NotFound);
    app_response(result)
}

#[utoipa::path(
    post,
    path = "/auth/apps/{app_id}/approve",
    params(("app_id" = String, Path, description = "Application id")),
    request_body = ApproveAppRequest,
    responses(
        (status = 200, description = "Registration approved", body = AppResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Unknown app or admin routes disabled", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "apps"
)]
#[instrument(skip_all, fields(app_id = %app_id))]
pub async fn approve_app(
    Path(app_id): Path<String>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ApproveAppRequest>>,
) -> Response {
    if let Err(response) =
        authorize_admin(&auth_state, &headers, peer.map(|ConnectInfo(addr)| addr)).await
    {
        return response;
    }
    let approved_by = payload
        .and_then(|Json(request)| request.approved_by)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_APPROVER.to_string());

    let result = auth_state
        .service()
        .apps()
        .approve(&app_id, &approved_by)
        .await;
    if result.is_ok() {
        info!(approved_by = %approved_by, "App registration approved");
    }
    app_response(result)
}

#[utoipa::path(
    post,
    path = "/auth/apps/{app_id}/reject",
    params(("app_id" = String, Path, description = "Application id")),
    request_body = AppReasonRequest,
    responses(
        (status = 200, description = "Registration rejected", body = AppResponse),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Unknown app or admin routes disabled", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "apps"
)]
#[instrument(skip_all, fields(app_id = %app_id))]
pub async fn reject_app(
    Path(app_id): Path<String>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AppReasonRequest>>,
) -> Response {
    if let Err(response) =
        authorize_admin(&auth_state, &headers, peer.map(|ConnectInfo(addr)| addr)).await
    {
        return response;
    }
    let Some(reason) = required_reason(payload) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing required field: reason");
    };

    let result = auth_state.service().apps().reject(&app_id, &reason).await;
    if result.is_ok() {
        info!("App registration rejected");
    }
    app_response(result)
}

#[utoipa::path(
    post,
    path = "/auth/apps/{app_id}/suspend",
    params(("app_id" = String, Path, description = "Application id")),
    request_body = AppReasonRequest,
    responses(
        (status = 200, description = "Registration suspended", body = AppResponse),
        (status = 400, description = "Missing reason", body = ErrorResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Unknown app or admin routes disabled", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "apps"
)]
#[instrument(skip_all, fields(app_id = %app_id))]
pub async fn suspend_app(
    Path(app_id): Path<String>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<AppReasonRequest>>,
) -> Response {
    if let Err(response) =
        authorize_admin(&auth_state, &headers, peer.map(|ConnectInfo(addr)| addr)).await
    {
        return response;
    }
    let Some(reason) = required_reason(payload) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing required field: reason");
    };

    let result = auth_state.service().apps().suspend(&app_id, &reason).await;
    if result.is_ok() {
        warn!("App registration suspended");
    }
    app_response(result)
}

fn required_reason(payload: Option<Json<AppReasonRequest>>) -> Option<String> {
    payload
        .map(|Json(request)| request.reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_matches_only_the_exact_secret() {
        let expected = SecretString::from("admin-s3cret");
        assert!(token_matches("admin-s3cret", &expected));
        assert!(!token_matches("admin-s3creT", &expected));
        assert!(!token_matches("admin", &expected));
        assert!(!token_matches("admin-s3cret-longer", &expected));
        assert!(!token_matches("", &expected));
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
