//! Application startup and lifecycle management.

use crate::config::AttendanceConfig;
use crate::handlers;
use crate::services::metrics::{http_metrics_middleware, init_metrics};
use crate::services::providers::gemini::{GeminiConfig, GeminiVisionProvider};
use crate::services::providers::VisionProvider;
use crate::services::Analyzer;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    request_id_middleware, security_headers_middleware, tracing::make_request_span,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state. Built once, read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: AttendanceConfig,
    pub analyzer: Analyzer,
}

impl AppState {
    pub fn new(config: AttendanceConfig, provider: Option<Arc<dyn VisionProvider>>) -> Self {
        let analyzer = Analyzer::new(provider, &config.analyze);
        Self { config, analyzer }
    }
}

/// Construct the Gemini provider, or `None` (degraded mode) without a key.
pub fn build_provider(
    config: &AttendanceConfig,
) -> Result<Option<Arc<dyn VisionProvider>>, AppError> {
    let Some(api_key) = config.gemini.api_key.clone() else {
        tracing::error!(
            "GEMINI_API_KEY is not set; /api/analyze will return a configuration error until restart"
        );
        return Ok(None);
    };

    let provider = GeminiVisionProvider::new(GeminiConfig {
        api_key,
        model: config.gemini.model.clone(),
        api_base: config.gemini.api_base.clone(),
        timeout: Duration::from_secs(config.gemini.timeout_secs),
    })
    .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    tracing::info!(
        model = %config.gemini.model,
        "Initialized Gemini vision provider"
    );

    Ok(Some(Arc::new(provider)))
}

pub fn build_router(state: AppState) -> Router {
    let analyze_route = post(handlers::analyze)
        .fallback(handlers::method_not_allowed)
        .layer(DefaultBodyLimit::max(state.config.analyze.max_upload_bytes));

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/analyze", analyze_route)
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route_layer(from_fn(http_metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the Gemini provider described by `config`.
    pub async fn build(config: AttendanceConfig) -> Result<Self, AppError> {
        let provider = build_provider(&config)?;
        Self::build_with_provider(config, provider).await
    }

    /// Build the application around an explicit provider (`None` = degraded).
    pub async fn build_with_provider(
        config: AttendanceConfig,
        provider: Option<Arc<dyn VisionProvider>>,
    ) -> Result<Self, AppError> {
        init_metrics().map_err(|e| {
            tracing::error!("Failed to initialize metrics: {}", e);
            AppError::InternalError(anyhow::Error::new(e))
        })?;

        let state = AppState::new(config.clone(), provider);
        let degraded = !state.analyzer.is_configured();
        let router = build_router(state);

        // port 0 = random port for testing
        let address = config.common.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            degraded,
            "attendance-service listening"
        );

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until the listener fails.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }

    /// Serve until Ctrl+C or SIGTERM, then drain in-flight requests.
    pub async fn run_with_graceful_shutdown(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
