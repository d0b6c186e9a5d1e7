use clap::{Arg, Command};

pub const ARG_DSN: &str = "dsn";
pub const ARG_REPLICA_DSN: &str = "replica-dsn";
pub const ARG_MAX_CONNECTIONS: &str = "max-connections";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long("dsn")
                .help("Primary database connection string")
                .long_help(
                    "Primary database connection string. \
                     Every write and every transaction goes here.",
                )
                .env("KEYWARD_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_REPLICA_DSN)
                .long("replica-dsn")
                .help("Read replica connection string (defaults to the primary)")
                .env("KEYWARD_REPLICA_DSN"),
        )
        .arg(
            Arg::new(ARG_MAX_CONNECTIONS)
                .long("max-connections")
                .help("Maximum pool size per store")
                .env("KEYWARD_MAX_CONNECTIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}
