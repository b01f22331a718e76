use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::chat::types::{ConversationId, InboundMessage};

/// Pending messages for one conversation plus its single debounce timer.
#[derive(Debug)]
pub struct ConversationBuffer {
    messages: Vec<InboundMessage>,
    /// Stamp of the most recent arm; a timer only drains a buffer still carrying its stamp.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl ConversationBuffer {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            generation: 0,
            timer: None,
        }
    }
}

/// Every live conversation buffer, behind one lock.
///
/// The lock is only held for in-memory bookkeeping, never across a timer
/// wait or an external call.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    buffers: Mutex<HashMap<ConversationId, ConversationBuffer>>,
    generations: AtomicU64,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `message` to its conversation's buffer (creating it if needed),
    /// cancels the pending timer and installs the one returned by `arm`.
    ///
    /// `arm` receives the generation the new timer must present to drain.
    /// Returns the number of messages now pending.
    pub async fn append<F>(&self, message: InboundMessage, arm: F) -> usize
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let mut buffers = self.buffers.lock().await;
        let buffer = buffers
            .entry(message.conversation)
            .or_insert_with(ConversationBuffer::new);

        buffer.messages.push(message);
        if let Some(previous) = buffer.timer.take() {
            previous.abort();
        }
        buffer.generation = generation;
        buffer.timer = Some(arm(generation));
        buffer.messages.len()
    }

    /// Removes and drains the buffer if `generation` is still its latest arm.
    /// A superseded timer gets `None` and must do nothing.
    pub async fn take_if_current(&self, conversation: ConversationId, generation: u64) -> Option<Vec<InboundMessage>> {
        let mut buffers = self.buffers.lock().await;
        match buffers.get(&conversation) {
            Some(buffer) if buffer.generation == generation => {
                buffers.remove(&conversation).map(|buffer| buffer.messages)
            }
            _ => None,
        }
    }

    pub async fn pending(&self, conversation: ConversationId) -> usize {
        self.buffers
            .lock()
            .await
            .get(&conversation)
            .map_or(0, |buffer| buffer.messages.len())
    }
}
