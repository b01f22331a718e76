use std::path::PathBuf;

use crate::chat::types::{Attachment, ConversationId, InboundMessage};
use crate::transient::TransientFile;
use crate::workflow::state::RunPayload;

/// One drained burst of messages, ordered and flattened.
#[derive(Debug, Clone)]
pub struct Batch {
    pub conversation: ConversationId,
    /// Text and caption fragments joined with newlines, in message order.
    pub body: String,
    /// Attachments in message order.
    pub attachments: Vec<Attachment>,
    pub message_count: usize,
}

impl Batch {
    /// Stable-sorts by message id; arrival order breaks ties.
    pub fn compose(conversation: ConversationId, mut messages: Vec<InboundMessage>) -> Self {
        messages.sort_by_key(|m| m.id);

        let body = messages
            .iter()
            .filter_map(InboundMessage::fragment)
            .collect::<Vec<_>>()
            .join("\n");
        let attachments = messages.iter().filter_map(|m| m.attachment.clone()).collect();

        Self {
            conversation,
            body,
            attachments,
            message_count: messages.len(),
        }
    }

    /// The text actually placed into the target application.
    ///
    /// `From <source> [<id>]: <body>`, tagged when attachments made it through.
    /// Attachments without any text give an empty string: nothing to caption.
    pub fn context_text(&self, source_label: &str, with_attachments: bool) -> String {
        if with_attachments && self.body.is_empty() {
            return String::new();
        }
        let mut text = format!("From {source_label} [{}]: {}", self.conversation, self.body);
        if with_attachments {
            text.push_str(" (Group/Attachments)");
        }
        text
    }
}

/// Downloaded attachments, split the way the workflow pastes them.
/// Dropping this removes every file.
#[derive(Debug, Default)]
pub struct StagedAttachments {
    pub images: Vec<TransientFile>,
    pub files: Vec<TransientFile>,
}

impl StagedAttachments {
    pub fn push(&mut self, attachment: &Attachment, file: TransientFile) {
        if attachment.is_image() {
            self.images.push(file);
        } else {
            self.files.push(file);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.images.len() + self.files.len()
    }

    /// Media group when anything was staged, otherwise a plain text run.
    pub fn payload(&self, text: String) -> RunPayload {
        if self.is_empty() {
            return RunPayload::Text(text);
        }
        let paths = |files: &[TransientFile]| -> Vec<PathBuf> { files.iter().map(|f| f.path().to_path_buf()).collect() };
        RunPayload::MediaGroup {
            images: paths(&self.images),
            files: paths(&self.files),
            text,
        }
    }
}
