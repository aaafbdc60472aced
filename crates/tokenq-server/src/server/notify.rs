//! Customer notifications.
//!
//! Delivery is best effort: the service never fails a request because a
//! notification could not be sent. [`LogNotifier`] is the default sink and
//! records what would have been sent.

use async_trait::async_trait;
use tokenq::ServiceRequest;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {reason}")]
    Delivery { reason: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Confirms a new submission and its token number.
    async fn confirm(&self, request: &ServiceRequest) -> Result<(), NotifyError>;

    /// Tells the holder of an upcoming token that their turn is near.
    async fn remind(&self, request: &ServiceRequest) -> Result<(), NotifyError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn confirm(&self, request: &ServiceRequest) -> Result<(), NotifyError> {
        tracing::info!(
            to = %request.email,
            token = request.token_number,
            "confirmation: service request received"
        );
        Ok(())
    }

    async fn remind(&self, request: &ServiceRequest) -> Result<(), NotifyError> {
        tracing::info!(
            to = %request.email,
            token = request.token_number,
            "reminder: your turn is coming up"
        );
        Ok(())
    }
}
