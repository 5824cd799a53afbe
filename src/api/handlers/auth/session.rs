//! Session verification and revocation endpoints.

use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

use super::{
    state::AuthState,
    types::{MessageResponse, RevokeRequest, VerifyRequest, VerifyResponse},
};
use crate::api::handlers::{caller_identity, ErrorResponse};

#[utoipa::path(
    post,
    path = "/auth/session/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Session is valid; one use was counted", body = VerifyResponse),
        (status = 400, description = "Missing or malformed session key", body = ErrorResponse),
        (status = 401, description = "Invalid or expired session", body = ErrorResponse),
        (status = 403, description = "Insufficient permissions", body = ErrorResponse),
        (status = 429, description = "Session quota or rate limit exceeded", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyRequest>>,
) -> Response {
    let caller = caller_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    match auth_state
        .service()
        .verify(&caller, &request.session_key, &request.required_permissions)
        .await
    {
        Ok(verified) => (
            StatusCode::OK,
            Json(VerifyResponse {
                success: true,
                session: verified.into(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/session/revoke",
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 400, description = "Missing or malformed session key", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn revoke(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RevokeRequest>>,
) -> Response {
    let caller = caller_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    match auth_state
        .service()
        .revoke(&caller, &request.session_key)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                success: true,
                message: "Session revoked successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
