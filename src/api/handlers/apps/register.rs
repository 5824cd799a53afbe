use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, instrument};

use super::types::{RegisterAppRequest, RegisterAppResponse};
use crate::{
    api::handlers::{auth::AuthState, caller_identity, ErrorResponse},
    rate_limit::RateLimitAction,
    redact::redact_email,
};

const NEXT_STEPS: [&str; 4] = [
    "Complete World ID app setup at developer.worldcoin.org",
    "Configure your app with the provided appId",
    "Wait for approval (if required)",
    "Start integrating the ShadowAuth SDK",
];

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterAppRequest,
    responses(
        (status = 201, description = "Registration created in pending state", body = RegisterAppResponse),
        (status = 400, description = "Missing or malformed fields", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = ErrorResponse),
    ),
    tag = "apps"
)]
/// Register a third-party application. New registrations await approval.
#[instrument(skip_all)]
pub async fn register(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterAppRequest>>,
) -> Response {
    let caller = caller_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    let service = auth_state.service();
    if let Err(err) = service.admit(&caller, RateLimitAction::Register).await {
        return err.into_response();
    }

    let request = payload.map(|Json(request)| request).unwrap_or_default();
    match service.apps().register(request.into()).await {
        Ok(registration) => {
            info!(
                app_id = %registration.app_id,
                app_name = %registration.app_name,
                contact_email = %redact_email(&registration.contact_email),
                "App registration created"
            );
            (
                StatusCode::CREATED,
                Json(RegisterAppResponse {
                    success: true,
                    registration,
                    next_steps: NEXT_STEPS.iter().map(ToString::to_string).collect(),
                }),
            )
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}
