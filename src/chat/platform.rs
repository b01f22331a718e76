use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chat::types::{Attachment, ConversationId};
use crate::errors::BridgeResult;
use crate::workflow::status::StatusNotifier;

/// The chat service as the bridge consumes it.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Downloads `attachment` to `dest`, creating or truncating the file.
    async fn download(&self, attachment: &Attachment, dest: &Path) -> BridgeResult<()>;

    async fn send_text(&self, conversation: ConversationId, text: &str) -> BridgeResult<()>;
}

/// Status notifier bound to one conversation.
///
/// `notify` never waits: texts are queued and a background task sends them
/// in order. The task ends once the notifier is dropped and the queue drained.
pub struct ConversationNotifier {
    conversation: ConversationId,
    tx: mpsc::UnboundedSender<String>,
}

impl ConversationNotifier {
    pub fn new(platform: Arc<dyn ChatPlatform>, conversation: ConversationId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if let Err(e) = platform.send_text(conversation, &text).await {
                    tracing::warn!(conversation = %conversation, error = %e, "status send failed");
                }
            }
        });
        Self { conversation, tx }
    }
}

impl StatusNotifier for ConversationNotifier {
    fn notify(&self, text: &str) {
        tracing::debug!(conversation = %self.conversation, status = text, "status queued");
        if self.tx.send(text.to_string()).is_err() {
            tracing::warn!(conversation = %self.conversation, "status sender gone; dropping status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(ConversationId, String)>>,
    }

    #[async_trait]
    impl ChatPlatform for Outbox {
        async fn download(&self, _attachment: &Attachment, _dest: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn send_text(&self, conversation: ConversationId, text: &str) -> BridgeResult<()> {
            // Yield so a racy implementation would reorder.
            tokio::task::yield_now().await;
            self.sent.lock().unwrap().push((conversation, text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn statuses_arrive_in_order() {
        let outbox = Arc::new(Outbox::default());
        let notifier = ConversationNotifier::new(outbox.clone(), ConversationId(42));
        notifier.notify("Thinking...");
        notifier.notify("Thinking...");
        notifier.notify("Timed out");
        drop(notifier);

        for _ in 0..50 {
            if outbox.sent.lock().unwrap().len() == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        let sent = outbox.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (ConversationId(42), "Thinking...".to_string()),
                (ConversationId(42), "Thinking...".to_string()),
                (ConversationId(42), "Timed out".to_string()),
            ]
        );
    }
}
