use clap::{Arg, ArgAction, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; the index is the `-v` count.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn parse_level(raw: &str) -> Result<u8, String> {
    let level = raw.trim().to_ascii_lowercase();

    if let Ok(count) = level.parse::<u8>()
        && usize::from(count) < LEVELS.len()
    {
        return Ok(count);
    }

    let name = match level.as_str() {
        "err" => "error",
        "warning" => "warn",
        other => other,
    };
    LEVELS
        .iter()
        .position(|known| *known == name)
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            format!(
                "unknown log level '{raw}', expected 0-4 or one of: {}",
                LEVELS.join(", ")
            )
        })
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Raise log verbosity, once per -v (error when unset)")
            .long_help(
                "Raise log verbosity, once per -v: warn, info, debug, trace. \
                 KEYWARD_LOG_LEVEL takes a level name or its 0-4 index.",
            )
            .env("KEYWARD_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
