use booking_service::config::BookingConfig;
use booking_service::services::init_metrics;
use booking_service::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = BookingConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "booking-service",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    );

    // Must run before any metric is recorded.
    if let Err(e) = init_metrics() {
        tracing::error!("Failed to install metrics recorder: {}", e);
    }

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    tracing::info!(port = application.port(), "booking-service started");
    application.run_until_stopped().await
}
