use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

use super::{
    state::AuthState,
    types::{LoginRequest, LoginResponse},
};
use crate::api::handlers::{caller_identity, ErrorResponse};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Missing or malformed fields", body = ErrorResponse),
        (status = 401, description = "Proof rejected or already used", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
        (status = 504, description = "Proof verification timed out", body = ErrorResponse),
    ),
    tag = "auth"
)]
/// Exchange a World ID proof for a session key.
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let caller = caller_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    // An unreadable body still goes through the rate limiter before it is refused.
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    match auth_state.service().login(&caller, request.into()).await {
        Ok(issued) => (
            StatusCode::OK,
            Json(LoginResponse {
                success: true,
                session: issued.into(),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
