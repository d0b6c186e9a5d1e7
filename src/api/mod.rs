//! HTTP transport.
//!
//! [`Services`] carries the user and token services into handlers as an axum
//! extension. The same router serves memory-backed tests and the Postgres
//! deployment.

use crate::{
    auth::TokenIssuer,
    repo::{
        memory::MemoryStore,
        postgres::{
            DataSources, PgAccountRepository, PgCredentialRepository, PgOutboxRepository,
            PgTransactor,
        },
    },
    service::{TokenExchange, TokenService, UserLifecycle, UserService},
};
use anyhow::Result;
use axum::{
    Extension, Json, Router,
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request},
    routing::{get, options},
};
use opentelemetry::{global, propagation::Extractor};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use ulid::Ulid;

pub mod handlers;
mod openapi;
pub mod policy;

pub use openapi::openapi;
pub use policy::{Authorizer, RolePolicy};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<dyn UserService>,
    pub tokens: Arc<dyn TokenService>,
    pub authorizer: Arc<dyn Authorizer>,
    /// `None` when running on the in-memory store.
    pub database: Option<DataSources>,
}

impl Services {
    /// Wire the Postgres repositories.
    #[must_use]
    pub fn postgres(sources: &DataSources, issuer: Arc<TokenIssuer>) -> Self {
        let users = UserLifecycle::new(
            PgTransactor::new(sources),
            PgAccountRepository::new(sources),
            PgCredentialRepository::new(sources),
            PgOutboxRepository::new(sources),
        );
        let tokens = TokenExchange::new(
            PgAccountRepository::new(sources),
            PgCredentialRepository::new(sources),
            issuer,
        );

        Self {
            users: Arc::new(users),
            tokens: Arc::new(tokens),
            authorizer: Arc::new(RolePolicy),
            database: Some(sources.clone()),
        }
    }

    /// Wire the in-memory repositories.
    #[must_use]
    pub fn memory(store: &MemoryStore, issuer: Arc<TokenIssuer>) -> Self {
        let users = UserLifecycle::new(
            store.transactor(),
            store.accounts(),
            store.credentials(),
            store.outbox(),
        );
        let tokens = TokenExchange::new(store.accounts(), store.credentials(), issuer);

        Self {
            users: Arc::new(users),
            tokens: Arc::new(tokens),
            authorizer: Arc::new(RolePolicy),
            database: None,
        }
    }
}

/// Build the application with its middleware stack.
pub fn router(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    let (router, document) = openapi::api_router().split_for_parts();
    let document = Arc::new(document);
    router
        .route(
            "/openapi.json",
            get(move || {
                let document = Arc::clone(&document);
                async move { Json(document.as_ref().clone()) }
            }),
        )
        .route("/health", options(handlers::health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(services)),
        )
}

/// Bind `[::]:port` and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(port: u16, services: Services) -> Result<()> {
    let app = router(services);
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

pub(crate) struct HeaderExtractor<'a>(pub(crate) &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let method = request.method().as_str();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    let span = info_span!("http-request", method, path, request_id);
    let parent = global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(headers))
    });
    span.set_parent(parent);
    span
}
