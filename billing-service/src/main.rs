//! Billing Service - Entry point
//!
//! Starts the Actix-web HTTP server for subscription and payment
//! management, plus the background period-end sweep that finalizes
//! soft-canceled subscriptions.

use actix_web::{web, App, HttpServer};
use shared::config::AppConfig;
use shared::database;
use shared::metrics::SecurityMetrics;
use shared::revocation::RevocationStore;
use shared::token::TokenEngine;
use shared::transport::MutualTls;
use shared::tracing_config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

use billing_service::api::{routes, AppState};
use billing_service::repository::BillingRepository;
use billing_service::service::{
    BillingService, IdempotencyLayer, PaymentGateway, SubscriptionService,
};

/// How often the period-end sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Sweep batch size.
const SWEEP_BATCH: i64 = 200;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env().expect("Failed to load configuration");
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "Starting billing-service"
    );

    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");

    let store = RevocationStore::new(&config.redis)
        .await
        .expect("Failed to connect to revocation store");

    let engine =
        Arc::new(TokenEngine::new(config.token.clone()).expect("Invalid token key material"));
    let metrics = Arc::new(SecurityMetrics::new());
    let gateway = Arc::new(PaymentGateway::new());

    let repository = BillingRepository::new(db_pool);
    let subscription_service =
        SubscriptionService::new(repository.clone(), gateway.clone(), metrics.clone());
    let billing_service = BillingService::new(repository, gateway);
    let idempotency = IdempotencyLayer::new(store.clone());

    // Background sweep: cancel-at-period-end subscriptions transition to
    // the terminal state once their period ends
    {
        let sweeper = subscription_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = sweeper.sweep_period_end_cancellations(SWEEP_BATCH).await {
                    warn!(error = %e, "Period-end sweep iteration failed");
                }
            }
        });
    }

    let app_state = web::Data::new(AppState {
        subscription_service,
        billing_service,
        idempotency,
        token_engine: engine,
        revocation_store: store,
        revocation_policy: config.revocation.clone(),
        metrics,
    });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(TracingLogger::default())
            .configure(routes::configure)
    });

    let bind_addr = (config.server.host.as_str(), config.server.port);
    let server = match &config.tls {
        Some(tls) => {
            let rustls_config =
                MutualTls::server_config(tls).expect("Invalid mutual-TLS configuration");
            info!("Binding with mutual TLS");
            server.bind_rustls_0_23(bind_addr, rustls_config)?
        }
        None => {
            info!("Binding without TLS (development only)");
            server.bind(bind_addr)?
        }
    };

    server.run().await
}
