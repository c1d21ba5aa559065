//! catalog-server - AI usage catalog service
//!
//! HTTP/JSON API for submitting usage entries, curating the reference
//! taxonomies, aggregating dashboards, and bulk import/export.

use anyhow::Result;
use catalog_server::{build_router, AppState};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "catalog-server", about = "AI usage catalog service")]
struct Args {
    /// Data folder holding the catalog database (overrides env/config file)
    #[arg(long)]
    data_dir: Option<String>,

    /// Port to listen on
    #[arg(long, default_value_t = 8080, env = "CATALOG_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting AI usage catalog (catalog-server) v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let data_dir = catalog_common::config::resolve_data_dir(args.data_dir.as_deref())?;
    let db_path = catalog_common::config::database_path(&data_dir);
    info!("Database path: {}", db_path.display());

    let pool = match catalog_common::db::init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    // First run: seed a default admin account so the instance is reachable
    if let Some(username) = catalog_server::store::users::seed_admin_if_empty(&pool).await? {
        warn!(
            "Seeded default admin user '{}' (password from CATALOG_ADMIN_PASSWORD or 'change-me'); \
             change it on first login",
            username
        );
    }

    // Expired-session cleanup: once at startup, then a periodic idempotent sweep
    let swept = catalog_server::store::users::cleanup_expired_sessions(&pool).await?;
    if swept > 0 {
        info!("Removed {} expired session(s)", swept);
    }
    let sweep_pool = pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            match catalog_server::store::users::cleanup_expired_sessions(&sweep_pool).await {
                Ok(0) => {}
                Ok(n) => info!("Removed {} expired session(s)", n),
                Err(e) => warn!("Session sweep failed: {}", e),
            }
        }
    });

    let state = AppState::new(pool);
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("catalog-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
