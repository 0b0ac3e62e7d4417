use std::{env, sync::Arc};

use haircut_booking::{
    app,
    config::AppConfig,
    database::{create_db_pool, run_migrations, PgStore},
    face::FaceAnalyzer,
    payment::RazorpayClient,
    AppState,
};
use lambda_http::run;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_writer(std::io::stdout);
    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .init();

    info!("Starting haircut booking service");

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return Err(e.into());
        }
    };

    // Initialize database connection
    let pool = match create_db_pool(&config.database_url, config.db_pool_size) {
        Ok(pool) => {
            info!("Database connection pool created successfully");
            pool
        }
        Err(e) => {
            error!("Failed to create database connection pool: {}", e);
            return Err(e.into());
        }
    };
    run_migrations(&pool)?;

    let gateway = RazorpayClient::new(config.gateway.clone())?;

    let faces = match FaceAnalyzer::from_config(&config.vision) {
        Ok(faces) => faces,
        Err(e) => {
            error!("Failed to load face models: {e:#}");
            return Err(e.into());
        }
    };

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        gateway: Arc::new(gateway),
        faces: Arc::new(faces),
        session_ttl_hours: config.session_ttl_hours,
    };
    let app = app(state);

    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        info!("Serving through the Lambda runtime");
        match run(app).await {
            Ok(()) => info!("Lambda executed successfully"),
            Err(e) => error!("Lambda execution error: {e}"),
        }
    } else {
        let listener = TcpListener::bind(&config.server_addr).await?;
        info!("Listening on {}", config.server_addr);
        axum::serve(listener, app).await?;
    }
    Ok(())
}
