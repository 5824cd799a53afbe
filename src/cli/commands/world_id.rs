use clap::{Arg, ArgMatches, Command};

pub const ARG_WORLD_ID_APP_ID: &str = "world-id-app-id";
pub const ARG_WORLD_ID_ACTION: &str = "world-id-action";
pub const ARG_WORLD_ID_VERIFY_URL: &str = "world-id-verify-url";
pub const ARG_VERIFIER_TIMEOUT_SECONDS: &str = "verifier-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub app_id: String,
    pub action: String,
    pub verify_url: String,
    pub timeout_seconds: u64,
}

impl Options {
    /// Parse World ID arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the app id is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let app_id = match matches.get_one::<String>(ARG_WORLD_ID_APP_ID) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_WORLD_ID_APP_ID}"),
        };

        Ok(Self {
            app_id,
            action: matches
                .get_one::<String>(ARG_WORLD_ID_ACTION)
                .cloned()
                .unwrap_or_else(|| "shadowauth-login".to_string()),
            verify_url: matches
                .get_one::<String>(ARG_WORLD_ID_VERIFY_URL)
                .cloned()
                .unwrap_or_else(|| "https://developer.worldcoin.org".to_string()),
            timeout_seconds: matches
                .get_one::<u64>(ARG_VERIFIER_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_WORLD_ID_APP_ID)
                .long(ARG_WORLD_ID_APP_ID)
                .help("World ID application id (app_...)")
                .env("SHADOWAUTH_WORLD_ID_APP_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_WORLD_ID_ACTION)
                .long(ARG_WORLD_ID_ACTION)
                .help("World ID action the proofs are bound to")
                .default_value("shadowauth-login")
                .env("SHADOWAUTH_WORLD_ID_ACTION"),
        )
        .arg(
            Arg::new(ARG_WORLD_ID_VERIFY_URL)
                .long(ARG_WORLD_ID_VERIFY_URL)
                .help("World ID developer portal base URL")
                .long_help(
                    "World ID developer portal base URL. Proofs are posted to `/api/v2/verify/<app_id>` under this URL.",
                )
                .default_value("https://developer.worldcoin.org")
                .env("SHADOWAUTH_WORLD_ID_VERIFY_URL"),
        )
        .arg(
            Arg::new(ARG_VERIFIER_TIMEOUT_SECONDS)
                .long(ARG_VERIFIER_TIMEOUT_SECONDS)
                .help("Seconds to wait for the proof verifier before giving up")
                .default_value("5")
                .env("SHADOWAUTH_VERIFIER_TIMEOUT_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..=60)),
        )
}
