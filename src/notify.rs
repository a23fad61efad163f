use async_trait::async_trait;

/// Best-effort outbound notifications (order confirmations, reconciliation
/// alerts). Send failures must never affect a committed transaction: callers
/// log and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Delivery mechanics are out of scope here; this sink records the message
/// in the log stream so operators can see what would have been sent.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        tracing::info!(recipient, subject, body, "notification");
        Ok(())
    }
}

/// A notice composed inside a transaction and delivered after commit.
#[derive(Debug, Clone)]
pub struct PendingNotice {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Drain composed notices through the notifier, logging failures instead of
/// propagating them.
pub async fn send_all(notifier: &dyn Notifier, notices: Vec<PendingNotice>) {
    for notice in notices {
        if let Err(err) = notifier
            .notify(&notice.recipient, &notice.subject, &notice.body)
            .await
        {
            tracing::warn!(error = %err, recipient = %notice.recipient, "notification send failed");
        }
    }
}
