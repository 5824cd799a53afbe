//! Session records, their store and the service that issues and checks them.
//!
//! A session is created after a proof of personhood is accepted, used until
//! its quota or expiry runs out, and ends either by revocation or by a sweep
//! that drops dead entries from memory.

mod error;
mod service;
mod store;

pub use error::{AuthError, SessionRejection, StoreError};
pub use service::{
    IssuedSession, LoginRequest, MaintenanceReport, SessionPolicy, SessionService, VerifiedSession,
};
pub use store::{CreateSessionParams, Session, SessionInfo, SessionStore};

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;

const SESSION_KEY_BYTES: usize = 32;

/// Create a new bearer session key: 32 bytes from the OS RNG, lowercase hex.
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn generate_session_key() -> Result<String> {
    let mut bytes = [0u8; SESSION_KEY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session key")?;
    Ok(hex::encode(bytes))
}

/// Session keys are 64 lowercase hex characters.
#[must_use]
pub fn is_valid_session_key(session_key: &str) -> bool {
    Regex::new(r"^[a-f0-9]{64}$").is_ok_and(|re| re.is_match(session_key))
}
