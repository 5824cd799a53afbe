use clap::{builder::ValueParser, Arg, ArgMatches, Command};

use crate::rate_limit::{RateLimitAction, RateLimitPolicy, RateLimitQuota};

pub const ARG_RATE_LIMIT_LOGIN: &str = "rate-limit-login";
pub const ARG_RATE_LIMIT_VERIFY: &str = "rate-limit-verify";
pub const ARG_RATE_LIMIT_REVOKE: &str = "rate-limit-revoke";
pub const ARG_RATE_LIMIT_REGISTER: &str = "rate-limit-register";
pub const ARG_RATE_LIMIT_ADMIN: &str = "rate-limit-admin";
pub const ARG_RATE_LIMIT_DEFAULT: &str = "rate-limit-default";

// (action, flag, env)
const QUOTA_ARGS: [(RateLimitAction, &str, &str); 6] = [
    (
        RateLimitAction::Login,
        ARG_RATE_LIMIT_LOGIN,
        "SHADOWAUTH_RATE_LIMIT_LOGIN",
    ),
    (
        RateLimitAction::Verify,
        ARG_RATE_LIMIT_VERIFY,
        "SHADOWAUTH_RATE_LIMIT_VERIFY",
    ),
    (
        RateLimitAction::Revoke,
        ARG_RATE_LIMIT_REVOKE,
        "SHADOWAUTH_RATE_LIMIT_REVOKE",
    ),
    (
        RateLimitAction::Register,
        ARG_RATE_LIMIT_REGISTER,
        "SHADOWAUTH_RATE_LIMIT_REGISTER",
    ),
    (
        RateLimitAction::Admin,
        ARG_RATE_LIMIT_ADMIN,
        "SHADOWAUTH_RATE_LIMIT_ADMIN",
    ),
    (
        RateLimitAction::Default,
        ARG_RATE_LIMIT_DEFAULT,
        "SHADOWAUTH_RATE_LIMIT_DEFAULT",
    ),
];

#[must_use]
pub fn validator_quota() -> ValueParser {
    ValueParser::from(|value: &str| value.parse::<RateLimitQuota>())
}

/// Built-in quotas, overridden per action by any `--rate-limit-*` flag given.
#[must_use]
pub fn policy(matches: &ArgMatches) -> RateLimitPolicy {
    QUOTA_ARGS
        .iter()
        .fold(RateLimitPolicy::default(), |policy, &(action, arg, _)| {
            match matches.get_one::<RateLimitQuota>(arg) {
                Some(quota) => policy.with_quota(action, *quota),
                None => policy,
            }
        })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let defaults = RateLimitPolicy::default();
    QUOTA_ARGS
        .iter()
        .fold(command, |command, &(action, arg, env)| {
            command.arg(
                Arg::new(arg)
                    .long(arg)
                    .help(format!(
                        "Quota for {action} requests as MAX/SECONDS (default: {})",
                        defaults.quota(action)
                    ))
                    .env(env)
                    .value_parser(validator_quota()),
            )
        })
}
