use crate::cli::{
    actions::{server::Args, Action},
    commands::{self, admin, rate_limit, session, world_id},
};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let base_path = matches
        .get_one::<String>(commands::ARG_BASE_PATH)
        .cloned()
        .unwrap_or_else(|| crate::api::DEFAULT_BASE_PATH.to_string());

    Ok(Action::Server(Args {
        port,
        base_path,
        world_id: world_id::Options::parse(matches)?,
        session: session::Options::parse(matches)?,
        rate_limits: rate_limit::policy(matches),
        admin: admin::Options::parse(matches),
    }))
}
