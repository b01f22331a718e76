use std::sync::Arc;

use crate::aggregator::batch::{Batch, StagedAttachments};
use crate::aggregator::buffer::BufferRegistry;
use crate::chat::platform::{ChatPlatform, ConversationNotifier};
use crate::chat::types::{ConversationId, InboundMessage};
use crate::config::AggregatorConfig;
use crate::transient::TransientFile;
use crate::workflow::engine::WorkflowRunner;

/// Coalesces bursts of inbound messages into one workflow run per
/// conversation, once the conversation has been quiet for the window.
#[derive(Clone)]
pub struct MessageAggregator {
    registry: Arc<BufferRegistry>,
    platform: Arc<dyn ChatPlatform>,
    runner: Arc<dyn WorkflowRunner>,
    config: AggregatorConfig,
}

impl MessageAggregator {
    pub fn new(
        registry: Arc<BufferRegistry>,
        platform: Arc<dyn ChatPlatform>,
        runner: Arc<dyn WorkflowRunner>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            registry,
            platform,
            runner,
            config,
        }
    }

    /// Buffers `message` and (re)starts its conversation's quiescence timer.
    pub async fn on_message(&self, message: InboundMessage) {
        let conversation = message.conversation;
        let this = self.clone();
        let pending = self
            .registry
            .append(message, move |generation| {
                tokio::spawn(this.fire_after_quiescence(conversation, generation))
            })
            .await;
        tracing::info!(conversation = %conversation, pending, "message buffered");
    }

    async fn fire_after_quiescence(self, conversation: ConversationId, generation: u64) {
        tokio::time::sleep(self.config.quiescence()).await;

        let Some(messages) = self.registry.take_if_current(conversation, generation).await else {
            return;
        };
        if messages.is_empty() {
            return;
        }
        self.process(Batch::compose(conversation, messages)).await;
    }

    /// Downloads, runs, and cleans up. Staged files are removed when this
    /// returns, whatever the run's outcome.
    async fn process(&self, batch: Batch) {
        tracing::info!(
            conversation = %batch.conversation,
            messages = batch.message_count,
            attachments = batch.attachments.len(),
            "processing batch"
        );

        let staged = self.download_all(&batch).await;
        let text = batch.context_text(&self.config.source_label, !staged.is_empty());
        let payload = staged.payload(text);

        let notifier = Arc::new(ConversationNotifier::new(self.platform.clone(), batch.conversation));
        let outcome = self.runner.run(payload, notifier).await;
        tracing::info!(conversation = %batch.conversation, ?outcome, staged = staged.len(), "batch finished");
    }

    /// Failed downloads are logged and left out of the run.
    async fn download_all(&self, batch: &Batch) -> StagedAttachments {
        let mut staged = StagedAttachments::default();
        for (i, attachment) in batch.attachments.iter().enumerate() {
            let file = TransientFile::unique(
                &format!("tg_batch_{}_{i}", batch.conversation),
                &attachment.extension(),
            );
            match self.platform.download(attachment, file.path()).await {
                Ok(()) => staged.push(attachment, file),
                Err(e) => tracing::warn!(
                    conversation = %batch.conversation,
                    file_id = %attachment.file_id,
                    error = %e,
                    "attachment download failed; skipping"
                ),
            }
        }
        staged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use crate::chat::types::Attachment;
    use crate::errors::{BridgeError, BridgeResult};
    use crate::workflow::state::{RunOutcome, RunPayload};
    use crate::workflow::status::StatusNotifier;

    #[derive(Default)]
    struct FakePlatform {
        fail_ids: Vec<String>,
        downloads: StdMutex<Vec<PathBuf>>,
        sent: StdMutex<Vec<(ConversationId, String)>>,
    }

    #[async_trait]
    impl ChatPlatform for FakePlatform {
        async fn download(&self, attachment: &Attachment, dest: &Path) -> BridgeResult<()> {
            if self.fail_ids.contains(&attachment.file_id) {
                return Err(BridgeError::Chat("file is too big".into()));
            }
            tokio::fs::write(dest, attachment.file_id.as_bytes()).await?;
            self.downloads.lock().unwrap().push(dest.to_path_buf());
            Ok(())
        }

        async fn send_text(&self, conversation: ConversationId, text: &str) -> BridgeResult<()> {
            self.sent.lock().unwrap().push((conversation, text.to_string()));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct RunRecord {
        at: Instant,
        payload: RunPayload,
        /// Whether each staged path existed while the run was going.
        existed: Vec<bool>,
    }

    struct RecordingRunner {
        tx: mpsc::UnboundedSender<RunRecord>,
        status: Option<String>,
    }

    #[async_trait]
    impl WorkflowRunner for RecordingRunner {
        async fn run(&self, payload: RunPayload, notifier: Arc<dyn StatusNotifier>) -> RunOutcome {
            let existed = match &payload {
                RunPayload::MediaGroup { images, files, .. } => {
                    images.iter().chain(files).map(|p| p.exists()).collect()
                }
                _ => Vec::new(),
            };
            if let Some(status) = &self.status {
                notifier.notify(status);
            }
            let _ = self.tx.send(RunRecord {
                at: Instant::now(),
                payload,
                existed,
            });
            RunOutcome::Completed
        }
    }

    struct Fixture {
        aggregator: MessageAggregator,
        registry: Arc<BufferRegistry>,
        platform: Arc<FakePlatform>,
        runs: mpsc::UnboundedReceiver<RunRecord>,
    }

    fn fixture_with(platform: FakePlatform, status: Option<String>) -> Fixture {
        let (tx, runs) = mpsc::unbounded_channel();
        let registry = Arc::new(BufferRegistry::new());
        let platform = Arc::new(platform);
        let aggregator = MessageAggregator::new(
            registry.clone(),
            platform.clone(),
            Arc::new(RecordingRunner { tx, status }),
            AggregatorConfig::default(),
        );
        Fixture {
            aggregator,
            registry,
            platform,
            runs,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakePlatform::default(), None)
    }

    fn text_of(payload: &RunPayload) -> &str {
        match payload {
            RunPayload::Text(t) => t,
            RunPayload::MediaGroup { text, .. } => text,
            RunPayload::Image(_) => "",
        }
    }

    async fn assert_no_more_runs(runs: &mut mpsc::UnboundedReceiver<RunRecord>) {
        let next = tokio::time::timeout(Duration::from_secs(30), runs.recv()).await;
        assert!(next.is_err(), "unexpected extra run: {next:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_batch() {
        let mut f = fixture();
        let conv = ConversationId(7);
        let start = Instant::now();

        f.aggregator.on_message(InboundMessage::text(1, conv, "one")).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        f.aggregator.on_message(InboundMessage::text(2, conv, "two")).await;
        tokio::time::sleep(Duration::from_millis(900)).await;
        f.aggregator.on_message(InboundMessage::text(3, conv, "three")).await;

        let run = f.runs.recv().await.unwrap();
        assert_eq!(run.at - start, Duration::from_millis(3900));
        assert!(matches!(run.payload, RunPayload::Text(_)));
        assert_eq!(text_of(&run.payload), "From Telegram [7]: one\ntwo\nthree");
        assert_no_more_runs(&mut f.runs).await;
    }

    #[tokio::test(start_paused = true)]
    async fn conversations_never_share_a_batch() {
        let mut f = fixture();
        let (a, b) = (ConversationId(1), ConversationId(2));

        f.aggregator.on_message(InboundMessage::text(1, a, "a1")).await;
        f.aggregator.on_message(InboundMessage::text(1, b, "b1")).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        f.aggregator.on_message(InboundMessage::text(2, a, "a2")).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        f.aggregator.on_message(InboundMessage::text(2, b, "b2")).await;

        let first = f.runs.recv().await.unwrap();
        let second = f.runs.recv().await.unwrap();
        assert_eq!(text_of(&first.payload), "From Telegram [1]: a1\na2");
        assert_eq!(text_of(&second.payload), "From Telegram [2]: b1\nb2");
        assert_no_more_runs(&mut f.runs).await;
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_delivery_is_sorted_by_id() {
        let mut f = fixture();
        let conv = ConversationId(3);
        f.aggregator.on_message(InboundMessage::text(21, conv, "second")).await;
        f.aggregator.on_message(InboundMessage::text(20, conv, "first")).await;

        let run = f.runs.recv().await.unwrap();
        assert_eq!(text_of(&run.payload), "From Telegram [3]: first\nsecond");
    }

    #[tokio::test(start_paused = true)]
    async fn message_after_drain_starts_fresh_batch() {
        let mut f = fixture();
        let conv = ConversationId(4);

        f.aggregator.on_message(InboundMessage::text(1, conv, "early")).await;
        let first = f.runs.recv().await.unwrap();
        assert_eq!(f.registry.pending(conv).await, 0);

        f.aggregator.on_message(InboundMessage::text(2, conv, "late")).await;
        assert_eq!(f.registry.pending(conv).await, 1);
        let second = f.runs.recv().await.unwrap();

        assert_eq!(text_of(&first.payload), "From Telegram [4]: early");
        assert_eq!(text_of(&second.payload), "From Telegram [4]: late");
    }

    #[tokio::test(start_paused = true)]
    async fn attachments_are_staged_for_the_run_and_removed_after() {
        let mut f = fixture();
        let conv = ConversationId(5);

        f.aggregator
            .on_message(InboundMessage::with_attachment(1, conv, Attachment::photo("photo-1"), Some("look".into())))
            .await;
        f.aggregator
            .on_message(InboundMessage::with_attachment(
                2,
                conv,
                Attachment::document("doc-1", Some("notes.pdf".into())),
                None,
            ))
            .await;

        let run = f.runs.recv().await.unwrap();
        assert_eq!(run.existed, vec![true, true]);
        let (images, files) = match &run.payload {
            RunPayload::MediaGroup { images, files, text } => {
                assert_eq!(text, "From Telegram [5]: look (Group/Attachments)");
                (images.clone(), files.clone())
            }
            other => panic!("expected media group, got {other:?}"),
        };
        assert_eq!(images.len(), 1);
        assert!(images[0].to_string_lossy().ends_with(".png"));
        assert_eq!(files.len(), 1);
        assert!(files[0].to_string_lossy().ends_with(".pdf"));

        // The batch task drops its staged files right after the run returns.
        tokio::time::sleep(Duration::from_millis(10)).await;
        for path in f.platform.downloads.lock().unwrap().iter() {
            assert!(!path.exists(), "{} left behind", path.display());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn attachments_only_batch_has_empty_text() {
        let mut f = fixture();
        let conv = ConversationId(6);
        f.aggregator
            .on_message(InboundMessage::with_attachment(1, conv, Attachment::photo("p"), None))
            .await;
        let run = f.runs.recv().await.unwrap();
        assert!(matches!(&run.payload, RunPayload::MediaGroup { text, .. } if text.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_downloads_fall_back_to_text_run() {
        let platform = FakePlatform {
            fail_ids: vec!["broken".into()],
            ..FakePlatform::default()
        };
        let mut f = fixture_with(platform, None);
        let conv = ConversationId(8);
        f.aggregator
            .on_message(InboundMessage::with_attachment(1, conv, Attachment::photo("broken"), Some("pic".into())))
            .await;

        let run = f.runs.recv().await.unwrap();
        assert!(matches!(run.payload, RunPayload::Text(_)));
        assert_eq!(text_of(&run.payload), "From Telegram [8]: pic");
    }

    #[tokio::test(start_paused = true)]
    async fn run_status_goes_back_to_the_conversation() {
        let mut f = fixture_with(FakePlatform::default(), Some("Thinking...".into()));
        let conv = ConversationId(9);
        f.aggregator.on_message(InboundMessage::text(1, conv, "hi")).await;
        f.runs.recv().await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            f.platform.sent.lock().unwrap().clone(),
            vec![(conv, "Thinking...".to_string())]
        );
    }
}
