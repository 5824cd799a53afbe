use clap::{Arg, ArgMatches, Command};

use crate::apps::valid_permissions;

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_MAX_USAGE: &str = "session-max-usage";
pub const ARG_SESSION_PERMISSIONS: &str = "session-permissions";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub ttl_seconds: i64,
    pub max_usage: u32,
    pub permissions: Vec<String>,
    pub sweep_interval_seconds: u64,
}

impl Options {
    /// Parse session policy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the permission list is empty or names an unknown permission.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let permissions: Vec<String> = matches
            .get_many::<String>(ARG_SESSION_PERMISSIONS)
            .map(|values| {
                values
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if permissions.is_empty() {
            anyhow::bail!("--{ARG_SESSION_PERMISSIONS} must name at least one permission");
        }
        if !valid_permissions(&permissions) {
            anyhow::bail!(
                "--{ARG_SESSION_PERMISSIONS} contains an unknown permission: {}",
                permissions.join(",")
            );
        }

        Ok(Self {
            ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(86_400),
            max_usage: matches
                .get_one::<u32>(ARG_SESSION_MAX_USAGE)
                .copied()
                .unwrap_or(100),
            permissions,
            sweep_interval_seconds: matches
                .get_one::<u64>(ARG_SWEEP_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(60),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .default_value("86400")
                .env("SHADOWAUTH_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(i64).range(1..=31_536_000)),
        )
        .arg(
            Arg::new(ARG_SESSION_MAX_USAGE)
                .long(ARG_SESSION_MAX_USAGE)
                .help("Successful verifications allowed per session")
                .default_value("100")
                .env("SHADOWAUTH_SESSION_MAX_USAGE")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_PERMISSIONS)
                .long(ARG_SESSION_PERMISSIONS)
                .help("Comma separated permissions granted to new sessions")
                .default_value("read,write")
                .env("SHADOWAUTH_SESSION_PERMISSIONS")
                .value_delimiter(','),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Seconds between sweeps of expired sessions and rate-limit windows")
                .default_value("60")
                .env("SHADOWAUTH_SWEEP_INTERVAL_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
