//! HTTP mapping for session errors.
//!
//! Missing, revoked and expired sessions collapse into one 401 so callers
//! cannot probe which keys once existed.

use axum::{
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use tracing::error;

use crate::{
    api::handlers::{error_response, ErrorResponse},
    apps::RegistryError,
    session::{AuthError, SessionRejection},
};

const RATE_LIMITED: &str = "Rate limit exceeded. Please try again later.";
const INTERNAL_ERROR: &str = "Internal server error";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
            Self::RateLimited {
                reset_at,
                retry_after_seconds,
            } => rate_limited_response(reset_at, retry_after_seconds),
            Self::ProofRejected(rejection) => {
                let mut body = ErrorResponse::new("World ID verification failed");
                body.details = Some(rejection.reason);
                body.field = rejection.field;
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            Self::NullifierReplayed => error_response(
                StatusCode::UNAUTHORIZED,
                "World ID proof has already been used",
            ),
            Self::VerificationTimeout => error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "World ID verification timed out",
            ),
            Self::VerifierUnavailable(_) => error_response(
                StatusCode::BAD_GATEWAY,
                "World ID verification unavailable",
            ),
            Self::AppNotRegistered => error_response(
                StatusCode::FORBIDDEN,
                "Application is not registered or not approved",
            ),
            Self::NotFound => error_response(
                StatusCode::NOT_FOUND,
                "Session not found or already revoked",
            ),
            Self::Session(rejection) => session_rejection_response(rejection),
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
        }
    }
}

fn session_rejection_response(rejection: SessionRejection) -> Response {
    match rejection {
        SessionRejection::NotFound | SessionRejection::Revoked | SessionRejection::Expired => {
            error_response(StatusCode::UNAUTHORIZED, "Invalid or expired session")
        }
        SessionRejection::QuotaExceeded => {
            error_response(StatusCode::TOO_MANY_REQUESTS, "Session usage limit exceeded")
        }
        SessionRejection::PermissionDenied => {
            error_response(StatusCode::FORBIDDEN, "Insufficient permissions")
        }
    }
}

fn rate_limited_response(reset_at: DateTime<Utc>, retry_after: i64) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        headers.insert(RETRY_AFTER, value);
    }

    let mut body = ErrorResponse::new(RATE_LIMITED);
    body.reset_at = Some(reset_at);
    (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => error_response(StatusCode::BAD_REQUEST, message),
            Self::NotFound => error_response(StatusCode::NOT_FOUND, "App not found"),
            Self::IdGeneration => {
                error!("Failed to generate app id");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::ProofRejection;
    use anyhow::{Context, Result};
    use axum::body::to_bytes;
    use chrono::TimeZone;
    use serde_json::Value;

    async fn body_json(response: Response) -> Result<Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn hidden_session_states_share_one_response() -> Result<()> {
        for rejection in [
            SessionRejection::NotFound,
            SessionRejection::Revoked,
            SessionRejection::Expired,
        ] {
            let response = AuthError::Session(rejection).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let body = body_json(response).await?;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "Invalid or expired session");
        }
        Ok(())
    }

    #[test]
    fn policy_rejections_map_to_distinct_statuses() {
        assert_eq!(
            AuthError::Session(SessionRejection::QuotaExceeded)
                .into_response()
                .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::Session(SessionRejection::PermissionDenied)
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::VerificationTimeout.into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AuthError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn rate_limited_sets_retry_after() -> Result<()> {
        let reset_at = Utc
            .with_ymd_and_hms(2024, 1, 1, 12, 1, 0)
            .single()
            .context("valid timestamp")?;
        let response = AuthError::RateLimited {
            reset_at,
            retry_after_seconds: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("42")
        );
        let body = body_json(response).await?;
        assert_eq!(body["resetAt"], "2024-01-01T12:01:00Z");
        Ok(())
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() -> Result<()> {
        let response = AuthError::Internal(anyhow::anyhow!("lock poisoned at 0xdeadbeef")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await?;
        assert_eq!(body["error"], "Internal server error");
        Ok(())
    }

    #[tokio::test]
    async fn proof_rejection_names_the_field() -> Result<()> {
        let response =
            AuthError::ProofRejected(ProofRejection::for_field("merkleRoot", "must be a hex string"))
                .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await?;
        assert_eq!(body["field"], "merkleRoot");
        assert_eq!(body["details"], "must be a hex string");
        Ok(())
    }
}
