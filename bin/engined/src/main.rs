//! Homeflow automation engine daemon.
//!
//! Wires the Postgres store, the NATS bus, and the HTTP mailer into the
//! engine, then runs until SIGINT.

mod config;

use config::DaemonConfig;
use homeflow_bus::NatsBus;
use homeflow_engine::{Engine, HttpMailer};
use homeflow_store::PgWorkflowStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = DaemonConfig::from_env().expect("failed to load configuration");
    tracing::info!("loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("running database migrations");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let store = Arc::new(PgWorkflowStore::new(db_pool));

    tracing::info!(url = %config.nats.url, "connecting to NATS");
    let bus = Arc::new(
        NatsBus::connect(&config.nats.url)
            .await
            .expect("failed to connect to NATS"),
    );

    let mailer = Arc::new(
        HttpMailer::new(&config.mail.base_url).expect("failed to build mail client"),
    );

    let engine = Engine::start(store, bus, mailer, config.engine.to_engine_config())
        .await
        .expect("failed to start engine");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("shutdown signal received");
    engine.stop();
}
