use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gamesales::config::Config;
use gamesales::db::{AppState, create_pool, init_audit_db, init_db, queries};
use gamesales::handlers;
use gamesales::integrations::{GoogleClient, MercadoPagoClient, TwilioClient};
use gamesales::sync;

#[derive(Parser, Debug)]
#[command(name = "gamesales")]
#[command(about = "Sales team backend: pipeline, metas, agendamentos, rankings, billing")]
struct Cli {
    /// Seed the database with a demo company (dev mode only)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds a demo company with an owner, a small team, deals and metas.
/// Only runs in dev mode and when the database is empty.
fn seed_demo_data(state: &AppState) {
    let mut conn = state
        .db
        .get()
        .expect("Failed to get db connection for seeding");

    match queries::seed_demo_data(&mut conn) {
        Ok(seed) => {
            tracing::info!("============================================");
            tracing::info!("DEMO COMPANY SEEDED");
            tracing::info!("Company: {}", seed.company_id);
            tracing::info!("Owner: {}", seed.owner_email);
            tracing::info!("API Key: {}", seed.owner_api_key);
            tracing::info!("============================================");
            tracing::info!("SAVE THIS API KEY - IT WILL NOT BE SHOWN AGAIN");
            tracing::info!("============================================");
        }
        Err(e) => {
            tracing::info!("Seeding skipped: {}", e);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamesales=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let master_key = match config.load_master_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Failed to load master key: {}", e);
            std::process::exit(1);
        }
    };

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let google = config.google.as_ref().map(|g| Arc::new(GoogleClient::new(g)));
    let mercadopago = config
        .mercadopago
        .as_ref()
        .map(|mp| Arc::new(MercadoPagoClient::new(mp)));
    let twilio = config.twilio.as_ref().map(|t| Arc::new(TwilioClient::new(t)));

    if google.is_none() {
        tracing::warn!("Google OAuth not configured; calendar sync is disabled");
    }
    if mercadopago.is_none() {
        tracing::warn!("Mercado Pago not configured; billing is disabled");
    }
    if twilio.is_none() {
        tracing::warn!("Twilio not configured; call reminders are disabled");
    }

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        master_key,
        base_url: config.base_url.clone(),
        app_url: config.app_url.clone(),
        audit_log_enabled: config.audit_log_enabled,
        mercadopago,
        google,
        twilio,
    };

    // Purge old audit logs on startup (0 = keep forever)
    if config.audit_log_retention_days > 0 {
        let conn = state
            .audit
            .get()
            .expect("Failed to get audit connection for purge");
        match queries::purge_old_audit_logs(&conn, config.audit_log_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} audit log entries older than {} days",
                    count,
                    config.audit_log_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old audit logs: {}", e);
            }
        }
    }

    if cli.seed {
        if config.dev_mode {
            seed_demo_data(&state);
        } else {
            tracing::warn!("--seed ignored outside dev mode (set GAMESALES_ENV=dev)");
        }
    }

    sync::spawn_calendar_sweep(state.clone(), config.calendar_sync_interval_secs);
    sync::spawn_reminder_task(state.clone(), config.reminder_lead_minutes);
    sync::spawn_maintenance_task(state.clone());

    let app = Router::new()
        // Public endpoints (no auth)
        .merge(handlers::public::router(config.rate_limit.clone()))
        // Webhook endpoints (signature auth)
        .merge(handlers::webhooks::router(config.rate_limit.clone()))
        // Company API (seller API key auth)
        .merge(handlers::company::router(state.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Game Sales server listening on {}", addr);

    // into_make_service_with_connect_info enables IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        for path in [&db_path, &audit_path] {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path, e);
            } else {
                tracing::info!("Removed {}", path);
            }
            let _ = std::fs::remove_file(format!("{}-wal", path));
            let _ = std::fs::remove_file(format!("{}-shm", path));
        }
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
