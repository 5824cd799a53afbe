//! Request/response types for session endpoints.
//!
//! Request fields default to empty so a missing field is reported by name
//! instead of as an unreadable body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::session::{IssuedSession, VerifiedSession};

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub proof: String,
    pub nullifier_hash: String,
    pub merkle_root: String,
    /// `orb` (default), `device` or `phone`.
    pub credential_type: Option<String>,
    /// Approved registration to log in for. Required when registration is enforced.
    pub app_id: Option<String>,
}

impl From<LoginRequest> for crate::session::LoginRequest {
    fn from(request: LoginRequest) -> Self {
        Self {
            proof: request.proof,
            nullifier_hash: request.nullifier_hash,
            merkle_root: request.merkle_root,
            credential_type: request.credential_type,
            app_id: request.app_id,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSessionBody {
    /// Bearer session key. Only ever returned here.
    pub key: String,
    pub expires_at: DateTime<Utc>,
    pub max_usage: u32,
    pub permissions: Vec<String>,
}

impl From<IssuedSession> for IssuedSessionBody {
    fn from(session: IssuedSession) -> Self {
        Self {
            key: session.session_key,
            expires_at: session.expires_at,
            max_usage: session.max_usage,
            permissions: session.permissions,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub session: IssuedSessionBody,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyRequest {
    pub session_key: String,
    pub required_permissions: Vec<String>,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusBody {
    pub is_valid: bool,
    pub expires_at: DateTime<Utc>,
    pub usage_count: u32,
    pub max_usage: u32,
    pub permissions: Vec<String>,
}

impl From<VerifiedSession> for SessionStatusBody {
    fn from(session: VerifiedSession) -> Self {
        Self {
            is_valid: true,
            expires_at: session.expires_at,
            usage_count: session.usage_count,
            max_usage: session.max_usage,
            permissions: session.permissions,
        }
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct VerifyResponse {
    pub success: bool,
    pub session: SessionStatusBody,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RevokeRequest {
    pub session_key: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}
