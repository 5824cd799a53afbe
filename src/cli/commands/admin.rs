use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ADMIN_TOKEN: &str = "admin-token";
pub const ARG_REQUIRE_REGISTERED_APP: &str = "require-registered-app";

#[derive(Debug, Clone)]
pub struct Options {
    pub token: Option<SecretString>,
    pub require_registered_app: bool,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            // An empty env var leaves the admin routes disabled.
            token: matches
                .get_one::<String>(ARG_ADMIN_TOKEN)
                .filter(|value| !value.trim().is_empty())
                .map(|value| SecretString::from(value.clone())),
            require_registered_app: matches.get_flag(ARG_REQUIRE_REGISTERED_APP),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ADMIN_TOKEN)
                .long(ARG_ADMIN_TOKEN)
                .help("Bearer token for the app review endpoints")
                .long_help(
                    "Bearer token for the app review endpoints under /auth/apps. When unset those endpoints answer 404.",
                )
                .env("SHADOWAUTH_ADMIN_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_REQUIRE_REGISTERED_APP)
                .long(ARG_REQUIRE_REGISTERED_APP)
                .help("Refuse logins that do not name an approved app registration (appId)")
                .env("SHADOWAUTH_REQUIRE_REGISTERED_APP")
                .action(ArgAction::SetTrue),
        )
}
