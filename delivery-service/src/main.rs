//! Delivery Service - Entry point
//!
//! Starts the Actix-web HTTP server plus the two background workers:
//! the email-queue processor and the webhook-delivery processor.

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

use delivery_service::api::{routes, AppState};
use delivery_service::repository::DeliveryRepository;
use delivery_service::service::mail_transport::LogOnlyTransport;
use delivery_service::service::{EmailService, WebhookService};

/// Worker poll interval. Retry delays start at one second, so the
/// queues are polled at the same cadence.
const WORKER_INTERVAL: Duration = Duration::from_secs(1);
/// Rows claimed per worker iteration.
const WORKER_BATCH: i64 = 50;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env().expect("Failed to load configuration");
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "Starting delivery-service"
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

    let repository = DeliveryRepository::new(db_pool);
    let email_service = EmailService::new(repository.clone(), Arc::new(LogOnlyTransport));
    let webhook_service = WebhookService::new(repository, metrics.clone());

    // Email-queue worker
    {
        let worker = email_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WORKER_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = worker.process_batch(WORKER_BATCH).await {
                    warn!(error = %e, "Email worker iteration failed");
                }
            }
        });
    }

    // Webhook-delivery worker
    {
        let worker = webhook_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WORKER_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = worker.process_batch(WORKER_BATCH).await {
                    warn!(error = %e, "Webhook worker iteration failed");
                }
            }
        });
    }

    let app_state = web::Data::new(AppState {
        email_service,
        webhook_service,
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
