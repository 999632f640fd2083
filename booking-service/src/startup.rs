use crate::config::BookingConfig;
use crate::handlers;
use crate::services::{
    BookingService, BookingStore, MockGateway, MongoStore, NotificationService, PaymentGateway,
    RazorpayGateway, ReconciliationEngine,
};
use axum::middleware::from_fn;
use axum::{
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub bookings: BookingService,
    pub reconciliation: ReconciliationEngine,
    pub notifications: NotificationService,
}

impl AppState {
    /// Wires the services over a store and gateway.
    pub fn new(
        config: &BookingConfig,
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let notifications = NotificationService::new(store.clone());
        let bookings = BookingService::new(
            store.clone(),
            notifications.clone(),
            config.pricing.clone(),
            config.payments.currency.clone(),
        );
        let reconciliation = ReconciliationEngine::new(
            store.clone(),
            gateway,
            notifications.clone(),
            Duration::from_secs(config.payments.gateway_timeout_secs),
        );

        Self {
            store,
            bookings,
            reconciliation,
            notifications,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/api/bookings/:kind",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_bookings),
        )
        .route("/api/bookings/:kind/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:kind/:id/status",
            patch(handlers::bookings::update_status),
        )
        .route(
            "/api/bookings/:kind/:id/cancel",
            patch(handlers::bookings::cancel_booking),
        )
        .route("/api/payments", get(handlers::payments::list_payments))
        .route("/api/payments/create", post(handlers::payments::create_order))
        .route("/api/payments/verify", post(handlers::payments::verify_payment))
        .route("/api/payments/:id", get(handlers::payments::get_payment))
        .route(
            "/webhooks/razorpay",
            post(handlers::webhooks::razorpay_webhook),
        )
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/api/notifications/:id/read",
            patch(handlers::notifications::mark_read),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Razorpay when credentials are present. Outside production a mock gateway
/// stands in so the service can run locally.
fn build_gateway(config: &BookingConfig) -> Result<Arc<dyn PaymentGateway>, AppError> {
    let timeout = Duration::from_secs(config.payments.gateway_timeout_secs);
    let razorpay = RazorpayGateway::new(config.razorpay.clone(), timeout)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

    if razorpay.is_configured() {
        tracing::info!("Razorpay gateway initialized");
        return Ok(Arc::new(razorpay));
    }

    if config.common.is_prod() {
        return Err(AppError::ConfigError(anyhow::anyhow!(
            "Razorpay credentials are required in production"
        )));
    }

    tracing::warn!("Razorpay credentials not configured, using mock gateway");
    Ok(Arc::new(MockGateway::new(
        config.razorpay.key_secret.expose_secret().clone(),
        config.razorpay.webhook_secret.expose_secret().clone(),
    )))
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: BookingConfig) -> Result<Self, AppError> {
        let store = MongoStore::connect(config.mongodb.uri.expose_secret(), &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                AppError::from(e)
            })?;
        store.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            AppError::from(e)
        })?;

        let gateway = build_gateway(&config)?;
        let state = AppState::new(&config, Arc::new(store), gateway);
        let app = router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        let store: Arc<dyn BookingStore> = Arc::new(InMemoryStore::new());
        let gateway: Arc<dyn PaymentGateway> = Arc::new(MockGateway::new("key", "webhook"));
        let config = BookingConfig {
            common: service_core::config::Config {
                port: 0,
                environment: "test".to_string(),
                log_level: "debug".to_string(),
                otlp_endpoint: None,
            },
            mongodb: crate::config::MongoConfig {
                uri: secrecy::Secret::new(String::new()),
                database: "booking_test".to_string(),
            },
            razorpay: crate::config::RazorpayConfig {
                key_id: String::new(),
                key_secret: secrecy::Secret::new(String::new()),
                webhook_secret: secrecy::Secret::new(String::new()),
                api_base_url: String::new(),
            },
            payments: Default::default(),
            pricing: Default::default(),
        };
        router(AppState::new(&config, store, gateway))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(json_body(response).await["service"], "booking-service");
    }

    #[tokio::test]
    async fn unknown_booking_type_is_rejected() {
        let response = app()
            .oneshot(
                Request::get("/api/bookings/spa")
                    .header("X-User-ID", "patient-1")
                    .header("X-User-Role", "patient")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_booking_type");
    }
}
