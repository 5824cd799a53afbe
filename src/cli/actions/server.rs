use crate::{
    api::{self, AuthConfig},
    cli::commands::{admin, session, world_id},
    rate_limit::{RateLimitAction, RateLimitPolicy},
};
use anyhow::Result;
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub base_path: String,
    pub world_id: world_id::Options,
    pub session: session::Options,
    pub rate_limits: RateLimitPolicy,
    pub admin: admin::Options,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new(self.world_id.app_id.clone())
            .with_world_id_action(self.world_id.action.clone())
            .with_world_id_verify_url(self.world_id.verify_url.clone())
            .with_verifier_timeout_seconds(self.world_id.timeout_seconds)
            .with_session_ttl_seconds(self.session.ttl_seconds)
            .with_session_max_usage(self.session.max_usage)
            .with_session_permissions(self.session.permissions.clone())
            .with_rate_limits(self.rate_limits.clone())
            .with_admin_token(self.admin.token.clone())
            .with_require_registered_app(self.admin.require_registered_app)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the verifier cannot be configured or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let base_path = api::normalize_base_path(&args.base_path);
    let sweep_interval = Duration::from_secs(args.session.sweep_interval_seconds);

    api::new(args.port, &base_path, sweep_interval, args.auth_config()).await
}

fn log_startup_args(args: &Args) {
    let quotas = [
        RateLimitAction::Login,
        RateLimitAction::Verify,
        RateLimitAction::Revoke,
        RateLimitAction::Register,
        RateLimitAction::Admin,
        RateLimitAction::Default,
    ]
    .iter()
    .map(|action| format!("{action}={}", args.rate_limits.quota(*action)))
    .collect::<Vec<_>>()
    .join(" ");

    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("base_path", api::normalize_base_path(&args.base_path)),
        ("world_id_app_id", args.world_id.app_id.clone()),
        ("world_id_action", args.world_id.action.clone()),
        ("world_id_verify_url", args.world_id.verify_url.clone()),
        (
            "verifier_timeout",
            format!("{}s", args.world_id.timeout_seconds),
        ),
        ("session_ttl", format!("{}s", args.session.ttl_seconds)),
        ("session_max_usage", args.session.max_usage.to_string()),
        ("session_permissions", args.session.permissions.join(",")),
        (
            "sweep_interval",
            format!("{}s", args.session.sweep_interval_seconds),
        ),
        ("rate_limits", quotas),
        ("admin_token_set", args.admin.token.is_some().to_string()),
        (
            "require_registered_app",
            args.admin.require_registered_app.to_string(),
        ),
    ];
    info!("{}", render_entries("Startup configuration", &entries));
}

fn render_entries(title: &str, entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    message
}

fn banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}

const BANNER: &str = r"
   .-----.
  /  o o  \
 |    ^    |   S H A D O W A U T H {VERSION}
  \  '-'  /
   '-----'";

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn args() -> Args {
        Args {
            port: 8080,
            base_path: "api/".to_string(),
            world_id: world_id::Options {
                app_id: "app_test".to_string(),
                action: "login".to_string(),
                verify_url: "https://developer.worldcoin.org".to_string(),
                timeout_seconds: 2,
            },
            session: session::Options {
                ttl_seconds: 600,
                max_usage: 4,
                permissions: vec!["read".to_string()],
                sweep_interval_seconds: 30,
            },
            rate_limits: RateLimitPolicy::default(),
            admin: admin::Options {
                token: Some(SecretString::from("hunter2")),
                require_registered_app: true,
            },
        }
    }

    #[test]
    fn test_auth_config_carries_every_option() {
        let config = args().auth_config();
        assert_eq!(config.world_id_app_id(), "app_test");
        assert_eq!(config.world_id_action(), "login");

        let policy = config.session_policy();
        assert_eq!(policy.max_usage(), 4);
        assert_eq!(policy.ttl(), chrono::Duration::seconds(600));
        assert_eq!(policy.verifier_timeout(), Duration::from_secs(2));
        assert!(policy.require_registered_app());
    }

    #[test]
    fn test_startup_log_hides_admin_token() {
        let args = args();
        let rendered = render_entries(
            "Startup configuration",
            &[("admin_token_set", args.admin.token.is_some().to_string())],
        );
        assert!(rendered.contains("admin_token_set: true"));
        assert!(!rendered.contains("hunter2"));
        assert!(!format!("{args:?}").contains("hunter2"));
    }

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }
}
