use crate::{
    api::{self, Services},
    auth::{TokenConfig, TokenIssuer},
    cli::telemetry,
    repo::postgres::{DataSources, apply_schema},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub replica_dsn: Option<String>,
    pub max_connections: u32,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the stores are unreachable, the schema cannot be applied,
/// the token keys are rejected or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let config = TokenConfig::new(args.access_token_secret, args.refresh_token_secret)
        .with_access_ttl(Duration::from_secs(args.access_token_ttl))
        .with_refresh_ttl(Duration::from_secs(args.refresh_token_ttl));
    let issuer = TokenIssuer::new(&config).context("Invalid token configuration")?;

    let sources = DataSources::connect(
        &args.dsn,
        args.replica_dsn.as_deref(),
        args.max_connections,
    )
    .await?;

    apply_schema(&sources.primary)
        .await
        .context("Failed to apply database schema")?;

    let services = Services::postgres(&sources, Arc::new(issuer));
    let result = api::serve(args.port, services).await;

    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        (
            "replica_dsn",
            args.replica_dsn
                .as_deref()
                .map_or_else(|| "primary".to_string(), redact_dsn),
        ),
        ("max_connections", args.max_connections.to_string()),
        ("access_token_ttl", format!("{}s", args.access_token_ttl)),
        ("refresh_token_ttl", format!("{}s", args.refresh_token_ttl)),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
