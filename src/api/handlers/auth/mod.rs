//! Session handlers and supporting modules.
//!
//! ## Flow
//!
//! 1) `POST /auth/login` verifies a World ID proof and issues a session key.
//! 2) `POST /auth/session/verify` checks the key and counts one use.
//! 3) `POST /auth/session/revoke` ends the session early.
//!
//! Every request is counted against a per-caller fixed window before any
//! session state is touched.

mod error;
pub(crate) mod login;
pub(crate) mod session;
mod state;
pub(crate) mod types;

pub use state::{AuthConfig, AuthState};
