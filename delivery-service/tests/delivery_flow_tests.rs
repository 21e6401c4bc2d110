//! Delivery flows against real Postgres.
//!
//! #[ignore]d by default:
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test -- --ignored
//! ```
//!
//! The SSRF rejection table and both retry schedules are covered by unit
//! tests in `src/`; these tests cover the database-backed queue
//! lifecycle and endpoint management.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shared::errors::ApiError;
use shared::identity::Caller;
use shared::metrics::SecurityMetrics;
use sqlx::PgPool;
use uuid::Uuid;

use delivery_service::domain::{EmailMessage, EmailStatus, NewEmail};
use delivery_service::repository::DeliveryRepository;
use delivery_service::service::mail_transport::{DeliveryOutcome, MailTransport};
use delivery_service::service::{EmailService, WebhookService};

/// Transport stub with a scripted outcome sequence; repeats the last
/// outcome when the script runs dry.
struct ScriptedTransport {
    outcomes: Mutex<VecDeque<DeliveryOutcome>>,
    fallback: DeliveryOutcome,
}

impl ScriptedTransport {
    fn new(outcomes: Vec<DeliveryOutcome>, fallback: DeliveryOutcome) -> Self {
        Self { outcomes: Mutex::new(outcomes.into()), fallback }
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn deliver(&self, _message: &EmailMessage) -> Result<DeliveryOutcome, ApiError> {
        Ok(self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback))
    }
}

async fn pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL required for integration tests");
    let pool = PgPool::connect(&database_url).await.expect("database");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");
    pool
}

fn caller() -> Caller {
    Caller {
        user_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        email: format!("ops+{}@example.com", Uuid::new_v4().simple()),
        roles: vec!["admin".to_string()],
    }
}

fn unique_recipient(tag: &str) -> String {
    format!("{}+{}@example.com", tag, Uuid::new_v4().simple())
}

fn email(recipient: &str) -> NewEmail {
    NewEmail {
        tenant_id: Some(Uuid::new_v4()),
        recipient: recipient.to_string(),
        template_id: "otp_login".to_string(),
        variables: serde_json::json!({ "code": "123456" }),
        priority: 8,
        scheduled_at: None,
    }
}

/// A message delivered on the first attempt lands in `sent`.
#[tokio::test]
#[ignore]
async fn email_sent_on_first_attempt() {
    let repository = DeliveryRepository::new(pool().await);
    let service = EmailService::new(
        repository.clone(),
        Arc::new(ScriptedTransport::new(vec![], DeliveryOutcome::Sent)),
    );

    let recipient = unique_recipient("sent");
    let queued = service.enqueue(email(&recipient)).await.unwrap().expect("queued");
    assert_eq!(queued.status, EmailStatus::Pending);

    service.process_batch(100).await.unwrap();

    let row = service.get_message(queued.email_id).await.unwrap();
    assert_eq!(row.status, EmailStatus::Sent);
    assert!(row.sent_at.is_some());
}

/// Soft bounces schedule retries with the 1 s / 5 s / 30 s delays; the
/// fourth soft bounce exhausts the message.
#[tokio::test]
#[ignore]
async fn email_soft_bounces_retry_then_exhaust() {
    let repository = DeliveryRepository::new(pool().await);
    let service = EmailService::new(
        repository.clone(),
        Arc::new(ScriptedTransport::new(vec![], DeliveryOutcome::SoftBounce)),
    );

    let recipient = unique_recipient("retry");
    let queued = service.enqueue(email(&recipient)).await.unwrap().expect("queued");

    // First attempt: soft bounce -> retry #1 scheduled one second out
    service.process_batch(100).await.unwrap();
    let row = service.get_message(queued.email_id).await.unwrap();
    assert_eq!(row.status, EmailStatus::Retry);
    assert_eq!(row.retry_count, 1);

    // Walk the remaining schedule by pulling scheduled_at into the past
    for expected_retry in 2..=3 {
        sqlx::query("UPDATE email_queue SET scheduled_at = NOW() WHERE email_id = $1")
            .bind(queued.email_id)
            .execute(repository.pool())
            .await
            .unwrap();
        service.process_batch(100).await.unwrap();
        let row = service.get_message(queued.email_id).await.unwrap();
        assert_eq!(row.retry_count, expected_retry);
    }

    // Retries consumed: the next soft bounce exhausts
    sqlx::query("UPDATE email_queue SET scheduled_at = NOW() WHERE email_id = $1")
        .bind(queued.email_id)
        .execute(repository.pool())
        .await
        .unwrap();
    service.process_batch(100).await.unwrap();

    let row = service.get_message(queued.email_id).await.unwrap();
    assert_eq!(row.status, EmailStatus::Exhausted);
}

/// A hard bounce terminates the message and suppresses the recipient;
/// later enqueues for that address are skipped.
#[tokio::test]
#[ignore]
async fn email_hard_bounce_suppresses_recipient() {
    let repository = DeliveryRepository::new(pool().await);
    let service = EmailService::new(
        repository.clone(),
        Arc::new(ScriptedTransport::new(vec![DeliveryOutcome::HardBounce], DeliveryOutcome::Sent)),
    );

    let recipient = unique_recipient("bounce");
    let queued = service.enqueue(email(&recipient)).await.unwrap().expect("queued");

    service.process_batch(100).await.unwrap();

    let row = service.get_message(queued.email_id).await.unwrap();
    assert_eq!(row.status, EmailStatus::Bounced);

    // The suppression gate skips the next send entirely
    let skipped = service.enqueue(email(&recipient)).await.unwrap();
    assert!(skipped.is_none());
}

/// SSRF rejection at creation, acceptance of a public URL, and the
/// sign/verify round trip on the returned secret.
#[tokio::test]
#[ignore]
async fn webhook_creation_enforces_url_policy_and_yields_signing_secret() {
    let repository = DeliveryRepository::new(pool().await);
    let metrics = Arc::new(SecurityMetrics::new());
    let service = WebhookService::new(repository, metrics);
    let caller = caller();

    // Cloud metadata endpoint is rejected before anything is stored
    let rejected = service
        .create_endpoint(
            &caller,
            "http://169.254.169.254/latest/meta-data",
            vec!["subscription.created".to_string()],
        )
        .await;
    assert!(matches!(rejected, Err(ApiError::WebhookUrlRejected { .. })));

    // A public URL is accepted and returns the secret exactly once
    let created = service
        .create_endpoint(
            &caller,
            "https://api.github.com/repos/x/y/dispatches",
            vec!["subscription.created".to_string()],
        )
        .await
        .expect("created");
    assert!(created.secret.starts_with("whsec_"));

    // Signing the payload yields 64 lowercase hex chars that verify on
    // the exact bytes and fail on any changed byte
    let payload = br#"{"event":"subscription.created"}"#;
    let signature = WebhookService::sign_payload(payload, &created.secret);
    assert_eq!(signature.len(), 64);
    assert!(WebhookService::verify_signature(payload, &created.secret, &signature));
    assert!(!WebhookService::verify_signature(
        br#"{"event":"subscription.deleted"}"#,
        &created.secret,
        &signature
    ));

    // The listing never re-exposes the secret
    let listed = service.list_endpoints(&caller).await.unwrap();
    assert_eq!(listed.len(), 1);
}

/// TestWebhook queues a synthetic delivery through the normal path, and
/// endpoint access is tenant-guarded.
#[tokio::test]
#[ignore]
async fn webhook_test_delivery_and_tenant_guard() {
    let repository = DeliveryRepository::new(pool().await);
    let metrics = Arc::new(SecurityMetrics::new());
    let service = WebhookService::new(repository, metrics);
    let owner = caller();
    let stranger = caller();

    let created = service
        .create_endpoint(&owner, "https://hooks.example.com/aegis", vec!["*".to_string()])
        .await
        .expect("created");

    let delivery = service
        .test_endpoint(&owner, created.endpoint.webhook_endpoint_id)
        .await
        .expect("test queued");
    assert_eq!(delivery.event_type, "webhook.test");

    // Cross-tenant access is a permission failure, not NotFound
    assert!(matches!(
        service
            .test_endpoint(&stranger, created.endpoint.webhook_endpoint_id)
            .await,
        Err(ApiError::TenantMismatch)
    ));

    service
        .delete_endpoint(&owner, created.endpoint.webhook_endpoint_id)
        .await
        .expect("deleted");
}
