use dotenvy::dotenv;
use snafu::ResultExt as _;
use tokio::net::TcpListener;

use watchmark::api::{cors, create_app, create_router};
use watchmark::config::Config;
use watchmark::database::Database;
use watchmark::error::{ApplicationError, BindAddressSnafu, ConnectDatabaseSnafu, WebServerSnafu};
use watchmark::logger;

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = Config::from_env()?;

    let _guard = logger::init(&config)?;

    let database = Database::connect(&config.surreal)
        .await
        .context(ConnectDatabaseSnafu)?;

    let router = create_router(create_app(database)).layer(cors(config.cors_origin.as_deref()));

    let listener = TcpListener::bind(config.host)
        .await
        .context(BindAddressSnafu { address: config.host })?;

    tracing::info!(address = %config.host, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context(WebServerSnafu)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?error, "failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }

    tracing::info!("shutting down");
}
