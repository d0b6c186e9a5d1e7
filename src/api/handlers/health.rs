use crate::{APP_USER_AGENT, GIT_COMMIT_HASH, api::Services};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tokio::time::{Duration, timeout};
use tracing::{Instrument, debug, error, info_span, warn};
use utoipa::ToSchema;

const HEALTH_DB_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Both stores answer", body = Health),
        (status = 503, description = "A store is unreachable", body = Health)
    ),
    tag = "health",
)]
/// Report build information and store connectivity. `OPTIONS` returns headers only.
pub async fn health(method: Method, Extension(services): Extension<Services>) -> impl IntoResponse {
    let (healthy, database) = match &services.database {
        Some(sources) => {
            let primary = ping(&sources.primary, "primary").await;
            let secondary = ping(&sources.secondary, "secondary").await;
            let healthy = primary && secondary;
            (healthy, if healthy { "ok" } else { "error" })
        }
        None => (true, "memory"),
    };

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: database.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = health.commit.get(0..7).unwrap_or("");

    let headers = format!("{APP_USER_AGENT}:{short_hash}")
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, headers, body)
}

async fn ping(pool: &PgPool, store: &'static str) -> bool {
    let probe = async {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE",
            store
        );
        let mut conn = match pool.acquire().instrument(acquire_span).await {
            Ok(conn) => conn,
            Err(err) => {
                error!("Failed to acquire {} connection: {}", store, err);
                return false;
            }
        };

        let ping_span = info_span!(
            "db.ping",
            db.system = "postgresql",
            db.operation = "PING",
            store
        );
        match conn.ping().instrument(ping_span).await {
            Ok(()) => true,
            Err(err) => {
                error!("Failed to ping {} database: {}", store, err);
                false
            }
        }
    };

    timeout(Duration::from_secs(HEALTH_DB_TIMEOUT_SECONDS), probe)
        .await
        .unwrap_or_else(|_| {
            warn!("{} health check timed out", store);
            false
        })
}
