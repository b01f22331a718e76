use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Screenshot tool failed; carries the tool's own diagnostic output.
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Template missing: {0}")]
    TemplateMissing(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Chat platform error: {0}")]
    Chat(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
