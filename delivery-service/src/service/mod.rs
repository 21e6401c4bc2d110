//! # Service Layer
//!
//! | Service | Responsibility |
//! |---------|----------------|
//! | [`EmailService`] | queue worker: claim, transport, retries, suppression |
//! | [`WebhookService`] | endpoints, signing, fan-out, delivery worker, auto-disable |
//! | [`url_policy`] | the string-based SSRF validator every target passes |
//! | [`mail_transport::MailTransport`] | collaborator boundary to the real mail system |

pub mod email_service;
pub mod mail_transport;
pub mod url_policy;
pub mod webhook_service;

pub use email_service::EmailService;
pub use webhook_service::WebhookService;
