use serde::{Deserialize, Serialize};

/// Extensions (lowercase, no dot) treated as pasteable images.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Used when a download carries no usable file name.
pub const DEFAULT_EXTENSION: &str = ".png";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub i64);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ConversationId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Document,
}

/// Reference to a file held by the chat platform; downloaded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    pub kind: AttachmentKind,
    pub file_name: Option<String>,
}

impl Attachment {
    pub fn photo(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            kind: AttachmentKind::Photo,
            file_name: None,
        }
    }

    pub fn document(file_id: impl Into<String>, file_name: Option<String>) -> Self {
        Self {
            file_id: file_id.into(),
            kind: AttachmentKind::Document,
            file_name,
        }
    }

    /// Extension for the local copy, dot included. Photos are always `.png`.
    pub fn extension(&self) -> String {
        self.file_name
            .as_deref()
            .and_then(|name| std::path::Path::new(name).extension())
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }

    /// Photos always are; documents are when their extension says so.
    pub fn is_image(&self) -> bool {
        match self.kind {
            AttachmentKind::Photo => true,
            AttachmentKind::Document => {
                let ext = self.extension().trim_start_matches('.').to_ascii_lowercase();
                IMAGE_EXTENSIONS.contains(&ext.as_str())
            }
        }
    }
}

/// One inbound chat message as the aggregator sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform sequence number; increases with send order within a conversation.
    pub id: i64,
    pub conversation: ConversationId,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub attachment: Option<Attachment>,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    pub fn text(id: i64, conversation: ConversationId, text: impl Into<String>) -> Self {
        Self {
            id,
            conversation,
            text: Some(text.into()),
            caption: None,
            attachment: None,
            received_at: chrono::Utc::now(),
        }
    }

    pub fn with_attachment(id: i64, conversation: ConversationId, attachment: Attachment, caption: Option<String>) -> Self {
        Self {
            id,
            conversation,
            text: None,
            caption,
            attachment: Some(attachment),
            received_at: chrono::Utc::now(),
        }
    }

    /// Text if present, else caption. Empty strings count as absent.
    pub fn fragment(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.caption.as_deref().filter(|c| !c.is_empty()))
    }
}
