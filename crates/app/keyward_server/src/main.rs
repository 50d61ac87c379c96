//! Keyward HTTP server binary.
//!
//! Reads configuration from the environment (and `.env`), connects to
//! PostgreSQL and serves the Keyward API until interrupted.

use std::sync::Arc;

use clap::Parser;
use keyward_api::AppState;
use keyward_api::config::ApiConfig;
use keyward_core::catalog::Catalog;
use keyward_core::notify::HttpNotifier;
use keyward_core::provision::provision_tenant;
use keyward_core::store::Stores;
use keyward_core::store::postgres::PgStore;
use keyward_core::tenant::TenantId;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

const DEFAULT_LOG_FILTER: &str = "info,keyward_api=debug,keyward_core=debug";

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "keyward_server", about = "Keyward identity and access-control server")]
struct Args {
    /// Port to listen on; overrides the port in `BIND_ADDR`.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Create the schema and tables for a tenant before serving (repeatable).
    #[arg(long = "provision-tenant", value_name = "TENANT")]
    provision_tenants: Vec<String>,
}

fn bind_addr(configured: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => {
            let host = configured
                .rsplit_once(':')
                .map_or(configured, |(host, _)| host);
            format!("{host}:{port}")
        }
        None => configured.to_string(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env()?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    config.bind_addr = bind_addr(&config.bind_addr, args.port);

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting keyward_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.database_url)
        .await?;

    for raw in &args.provision_tenants {
        let tenant = TenantId::parse(raw)?;
        provision_tenant(&pool, &tenant).await?;
    }

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::embedded()?,
    };
    info!(
        features = catalog.features().len(),
        menus = catalog.menus().len(),
        "catalog loaded"
    );

    let notifier = Arc::new(HttpNotifier::new(&config.notifications_url)?);
    let stores = Stores::shared(Arc::new(PgStore::new(pool)));
    let bind = config.bind_addr.clone();
    let state = AppState::new(config, stores, notifier, catalog)?;
    let app = keyward_api::router(state);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_flag_replaces_configured_port() {
        assert_eq!(bind_addr("127.0.0.1:7772", Some(9000)), "127.0.0.1:9000");
        assert_eq!(bind_addr("0.0.0.0:7772", None), "0.0.0.0:7772");
    }

    #[test]
    fn provision_flag_repeats() {
        let args = Args::parse_from([
            "keyward_server",
            "--provision-tenant",
            "acme",
            "--provision-tenant",
            "globex",
        ]);
        assert_eq!(args.provision_tenants, ["acme", "globex"]);
        assert_eq!(args.max_connections, 10);
    }
}
