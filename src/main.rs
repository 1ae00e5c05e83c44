use std::net::TcpListener;
use std::time::Duration;

use authgate::auth::spawn_pruner;
use authgate::configuration::get_configuration;
use authgate::startup::{run, AuthServices};
use authgate::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("info");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read configuration");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // Lazy so the process starts even while the database is still coming up
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy(&configuration.database.connection_string())
        .map_err(|e| {
            tracing::error!(error = %e, "Invalid database settings");
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Database configuration error")
        })?;

    let services = AuthServices::from_pool(&configuration, pool).map_err(|e| {
        tracing::error!(error = %e, "Failed to assemble auth services");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Startup error")
    })?;

    let _pruner = spawn_pruner(
        services.revocation_store(),
        configuration.revocation.prune_interval(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(
        address = %address,
        rotate_refresh_tokens = configuration.jwt.rotate_refresh_tokens,
        revocation_backend = ?configuration.revocation.backend,
        "Server listening"
    );

    run(listener, services)?.await
}
