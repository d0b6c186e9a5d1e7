use crate::cli::{
    actions::{Action, server::Args},
    commands::{
        ARG_PORT,
        database::{ARG_DSN, ARG_MAX_CONNECTIONS, ARG_REPLICA_DSN},
        tokens::{
            ARG_ACCESS_TOKEN_SECRET, ARG_ACCESS_TOKEN_TTL, ARG_REFRESH_TOKEN_SECRET,
            ARG_REFRESH_TOKEN_TTL,
        },
    },
};
use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    Url::parse(&dsn).context("invalid --dsn")?;

    let replica_dsn = matches.get_one::<String>(ARG_REPLICA_DSN).cloned();
    if let Some(replica) = &replica_dsn {
        Url::parse(replica).context("invalid --replica-dsn")?;
    }

    let max_connections = matches
        .get_one::<u32>(ARG_MAX_CONNECTIONS)
        .copied()
        .unwrap_or(5);

    let access_secret = matches
        .get_one::<String>(ARG_ACCESS_TOKEN_SECRET)
        .cloned()
        .context("missing required argument: --access-token-secret")?;
    let refresh_secret = matches
        .get_one::<String>(ARG_REFRESH_TOKEN_SECRET)
        .cloned()
        .context("missing required argument: --refresh-token-secret")?;
    if access_secret == refresh_secret {
        return Err(anyhow!(
            "--{ARG_REFRESH_TOKEN_SECRET} must differ from --{ARG_ACCESS_TOKEN_SECRET}"
        ));
    }

    let access_token_ttl = matches
        .get_one::<u64>(ARG_ACCESS_TOKEN_TTL)
        .copied()
        .context("missing argument: --access-token-ttl")?;
    let refresh_token_ttl = matches
        .get_one::<u64>(ARG_REFRESH_TOKEN_TTL)
        .copied()
        .context("missing argument: --refresh-token-ttl")?;
    if refresh_token_ttl <= access_token_ttl {
        return Err(anyhow!(
            "--{ARG_REFRESH_TOKEN_TTL} ({refresh_token_ttl}s) must exceed \
             --{ARG_ACCESS_TOKEN_TTL} ({access_token_ttl}s)"
        ));
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        replica_dsn,
        max_connections,
        access_token_secret: SecretString::from(access_secret),
        refresh_token_secret: SecretString::from(refresh_secret),
        access_token_ttl,
        refresh_token_ttl,
    }))
}
