use clap::{Arg, Command};

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long("access-token-secret")
                .help("HS256 signing key for access tokens")
                .env("KEYWARD_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long("refresh-token-secret")
                .help("HS256 signing key for refresh tokens, must differ from the access key")
                .env("KEYWARD_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long("access-token-ttl")
                .help("Access token lifetime in seconds")
                .env("KEYWARD_ACCESS_TOKEN_TTL")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long("refresh-token-ttl")
                .help("Refresh token lifetime in seconds, must exceed the access lifetime")
                .env("KEYWARD_REFRESH_TOKEN_TTL")
                .default_value("1209600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
