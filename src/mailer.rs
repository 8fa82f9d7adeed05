//! Outbound email abstraction. Delivery is best-effort at the call sites; the
//! trait only reports success or failure.

use async_trait::async_trait;

use crate::models::AppError;

#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), AppError>;
}

/// Dev sender that logs the message instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), AppError> {
        tracing::info!(to = %email.to, subject = %email.subject, "outbound email (log sender)");
        Ok(())
    }
}
