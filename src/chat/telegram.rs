/// Telegram Bot API adapter: long polling for inbound messages, file
/// download, and plain-text replies.
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::chat::platform::ChatPlatform;
use crate::chat::types::{Attachment, ConversationId, InboundMessage};
use crate::config::TelegramConfig;
use crate::errors::{BridgeError, BridgeResult};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Request URLs carry the bot token, so it is stripped before the error
/// reaches logs or the tool server's clients.
fn http_error(e: reqwest::Error) -> BridgeError {
    BridgeError::Http(e.without_url())
}

pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
    poll_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    date: i64,
    chat: TgChat,
    text: Option<String>,
    caption: Option<String>,
    photo: Option<Vec<PhotoSize>>,
    document: Option<TgDocument>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct TgDocument {
    file_id: String,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

impl TgMessage {
    /// Text, photo and document messages; everything else is ignored.
    fn into_inbound(self) -> Option<InboundMessage> {
        let attachment = if let Some(sizes) = self.photo {
            sizes
                .into_iter()
                .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
                .map(|largest| Attachment::photo(largest.file_id))
        } else {
            self.document
                .map(|doc| Attachment::document(doc.file_id, doc.file_name))
        };

        if attachment.is_none() && self.text.is_none() {
            return None;
        }
        Some(InboundMessage {
            id: self.message_id,
            conversation: ConversationId(self.chat.id),
            text: self.text,
            caption: self.caption,
            attachment,
            received_at: chrono::DateTime::from_timestamp(self.date, 0).unwrap_or_else(chrono::Utc::now),
        })
    }
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, token: &str) -> BridgeResult<Self> {
        let client = reqwest::Client::builder()
            // Long polls hold the request open for poll_timeout_secs.
            .timeout(Duration::from_secs(config.poll_timeout_secs + 30))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> BridgeResult<T> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await.map_err(http_error)?;
        if !parsed.ok {
            return Err(BridgeError::Chat(format!(
                "{method}: {status}: {}",
                parsed.description.unwrap_or_default()
            )));
        }
        parsed
            .result
            .ok_or_else(|| BridgeError::Chat(format!("{method}: empty result")))
    }

    async fn get_updates(&self, offset: i64) -> BridgeResult<Vec<Update>> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    /// Long-polls forever, handing every usable message to `handler`.
    /// Transport errors back off briefly and polling continues.
    pub async fn poll<F>(&self, handler: F)
    where
        F: Fn(InboundMessage) + Send + Sync,
    {
        let mut offset = 0i64;
        tracing::info!(timeout_secs = self.poll_timeout_secs, "telegram long polling started");
        loop {
            match self.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let Some(message) = update.message.and_then(TgMessage::into_inbound) else {
                            continue;
                        };
                        tracing::debug!(
                            conversation = %message.conversation,
                            message_id = message.id,
                            attachment = message.attachment.is_some(),
                            "message received"
                        );
                        handler(message);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "getUpdates failed; retrying");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn download(&self, attachment: &Attachment, dest: &Path) -> BridgeResult<()> {
        let file: TgFile = self
            .call("getFile", serde_json::json!({ "file_id": attachment.file_id }))
            .await?;
        let file_path = file
            .file_path
            .ok_or_else(|| BridgeError::Chat(format!("no file_path for {}", attachment.file_id)))?;

        let response = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            return Err(BridgeError::Chat(format!("download {file_path}: {}", response.status())));
        }

        let mut out = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_error)?;
            written += chunk.len();
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        tracing::debug!(file_id = %attachment.file_id, dest = %dest.display(), bytes = written, "attachment downloaded");
        Ok(())
    }

    async fn send_text(&self, conversation: ConversationId, text: &str) -> BridgeResult<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                serde_json::json!({ "chat_id": conversation.0, "text": text }),
            )
            .await?;
        tracing::debug!(conversation = %conversation, chars = text.chars().count(), "message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::types::AttachmentKind;

    fn parse(json: &str) -> Option<InboundMessage> {
        let update: Update = serde_json::from_str(json).unwrap();
        update.message.and_then(TgMessage::into_inbound)
    }

    #[test]
    fn text_message() {
        let msg = parse(
            r#"{"update_id": 10, "message": {"message_id": 5, "date": 1700000000,
                "chat": {"id": -1001}, "text": "hello"}}"#,
        )
        .unwrap();
        assert_eq!(msg.id, 5);
        assert_eq!(msg.conversation, ConversationId(-1001));
        assert_eq!(msg.fragment(), Some("hello"));
        assert_eq!(msg.received_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn photo_picks_largest_size() {
        let msg = parse(
            r#"{"update_id": 11, "message": {"message_id": 6, "date": 0, "chat": {"id": 9},
                "caption": "see",
                "photo": [
                    {"file_id": "small", "width": 90, "height": 60},
                    {"file_id": "large", "width": 1280, "height": 853},
                    {"file_id": "medium", "width": 320, "height": 213}
                ]}}"#,
        )
        .unwrap();
        let att = msg.attachment.unwrap();
        assert_eq!(att.file_id, "large");
        assert_eq!(att.kind, AttachmentKind::Photo);
        assert_eq!(msg.caption.as_deref(), Some("see"));
    }

    #[test]
    fn document_keeps_file_name() {
        let msg = parse(
            r#"{"update_id": 12, "message": {"message_id": 7, "date": 0, "chat": {"id": 9},
                "document": {"file_id": "doc", "file_name": "notes.pdf"}}}"#,
        )
        .unwrap();
        let att = msg.attachment.unwrap();
        assert_eq!(att.kind, AttachmentKind::Document);
        assert_eq!(att.file_name.as_deref(), Some("notes.pdf"));
    }

    #[test]
    fn other_messages_are_ignored() {
        assert!(parse(
            r#"{"update_id": 13, "message": {"message_id": 8, "date": 0, "chat": {"id": 9},
                "sticker": {"file_id": "s"}}}"#
        )
        .is_none());
        assert!(parse(r#"{"update_id": 14}"#).is_none());
    }

    #[test]
    fn urls_embed_token() {
        let config = TelegramConfig {
            api_base: "https://api.example.org/".into(),
            ..TelegramConfig::default()
        };
        let client = TelegramClient::new(&config, "123:abc").unwrap();
        assert_eq!(client.method_url("getMe"), "https://api.example.org/bot123:abc/getMe");
        assert_eq!(
            client.file_url("photos/file_1.jpg"),
            "https://api.example.org/file/bot123:abc/photos/file_1.jpg"
        );
    }

    fn unreachable_client() -> TelegramClient {
        let config = TelegramConfig {
            api_base: "http://127.0.0.1:1".into(),
            ..TelegramConfig::default()
        };
        TelegramClient::new(&config, "123456:SECRET-TOKEN").unwrap()
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_the_token() {
        let client = unreachable_client();

        let err = client.send_text(ConversationId(1), "hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::Http(_)));
        assert!(!err.to_string().contains("SECRET-TOKEN"), "{err}");

        let dest = std::env::temp_dir().join("telegram_unreachable_download.bin");
        let err = client.download(&Attachment::photo("p"), &dest).await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-TOKEN"), "{err}");

        let err = client.get_updates(0).await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-TOKEN"), "{err}");
    }

    #[test]
    fn api_error_shape_parses() {
        let parsed: ApiResponse<serde_json::Value> =
            serde_json::from_str(r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#).unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.description.as_deref(), Some("Unauthorized"));
    }
}
