//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (rate limiting, tracing, request ID)
//! - Bind server to listener
//! - Run the bucket sweeper alongside the server

use axum::{
    extract::{Json, State},
    http::{HeaderName, Request},
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admission::RateLimiter;
use crate::config::GatewayConfig;
use crate::forwarding::{ForwardGateway, ForwardPayload, ForwardResult};
use crate::http::request::{RequestIdExt, UuidRequestId};
use crate::http::response::outcome_response;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::security::rate_limit::{rate_limit_middleware, AdmissionState};

/// Application state injected into handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub gateway: ForwardGateway,
}

/// HTTP server for the admission gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    limiter: RateLimiter,
}

impl HttpServer {
    /// Create a server with production collaborators built from `config`.
    pub fn from_config(config: GatewayConfig) -> ForwardResult<Self> {
        let limiter = RateLimiter::new(&config.rate_limit);
        let gateway = ForwardGateway::from_config(&config)?;
        Ok(Self::new(config, limiter, gateway))
    }

    /// Create a server around existing collaborators.
    pub fn new(config: GatewayConfig, limiter: RateLimiter, gateway: ForwardGateway) -> Self {
        let router = build_router(&config, limiter.clone(), gateway);
        Self {
            router,
            config,
            limiter,
        }
    }

    /// Run until `shutdown` fires, accepting connections on `listener`.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            requests_per_minute = self.config.rate_limit.requests_per_minute,
            upstream = %self.config.forwarding.upstream_url,
            timeout_seconds = self.config.forwarding.timeout_seconds,
            "HTTP server starting"
        );

        let sweeper = self.limiter.spawn_sweeper(
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1)),
            shutdown.resubscribe(),
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "Bucket sweeper ended abnormally");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Configuration the server was built from.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Limiter shared with the admission middleware.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &GatewayConfig, limiter: RateLimiter, gateway: ForwardGateway) -> Router {
    // Validation rejects illegal names; an unparsable one is treated as unset.
    let identity_header = config
        .rate_limit
        .identity_header
        .as_deref()
        .and_then(|name| HeaderName::from_bytes(name.as_bytes()).ok());
    let admission = AdmissionState {
        limiter,
        identity_header,
    };

    Router::new()
        .route("/forward", post(forward_handler))
        .route_layer(middleware::from_fn_with_state(admission, rate_limit_middleware))
        .route("/health", get(health_handler))
        .with_state(AppState { gateway })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request.request_id(),
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn forward_handler(
    State(state): State<AppState>,
    Json(payload): Json<ForwardPayload>,
) -> Response {
    let outcome = state.gateway.forward(&payload.url).await;
    if let Err(e) = &outcome {
        tracing::debug!(url = %payload.url, kind = e.kind(), error = %e, "Forward failed");
    }

    let response = outcome_response(outcome);
    metrics::record_request("forward", response.status().as_u16());
    response
}

async fn health_handler() -> &'static str {
    "OK"
}
