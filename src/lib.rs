//! # ShadowAuth (Proof-of-Personhood Session Authority)
//!
//! `shadowauth` exchanges a World ID zero-knowledge proof for a short-lived,
//! usage-bounded bearer **session key**. Downstream services present that key
//! to `/auth/session/verify` to learn whether the caller is still a verified
//! unique human, with which permissions, and how much of its quota is left.
//!
//! ## Sessions
//!
//! - **Keys:** 32 bytes from the OS RNG, hex encoded. The key is returned once,
//!   at login, and every log line carries only its first 8 characters.
//! - **Checks:** verification runs lookup, revocation, expiry, quota and
//!   permissions in that order and stops at the first failure. A use is only
//!   counted after all checks pass.
//! - **Nullifiers:** a World ID nullifier backs at most one live session. The
//!   binding is released when the session is revoked or swept.
//!
//! ## Rate Limiting
//!
//! Every endpoint is guarded by a per-caller **fixed-window** counter keyed by
//! `"{caller}:{action}"`. Bursts across a window boundary are allowed; the
//! window resets only once it has fully elapsed.
//!
//! ## Storage
//!
//! All state is process-local and lost on restart. A background task sweeps
//! dead sessions and elapsed rate-limit windows on a fixed interval.

pub mod api;
pub mod apps;
pub mod cli;
pub mod clock;
pub mod rate_limit;
pub mod redact;
pub mod session;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
