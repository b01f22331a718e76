use std::path::PathBuf;

/// Lifecycle of one automation run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    PlacingContent,
    Submitting,
    AwaitingBusy,
    Monitoring,
    Done { outcome: RunOutcome },
}

/// What gets placed into the target application's input surface.
#[derive(Debug, Clone)]
pub enum RunPayload {
    Text(String),
    Image(PathBuf),
    /// Images are pasted one by one, then file references, then the text.
    /// Submitted once, after everything is staged.
    MediaGroup {
        images: Vec<PathBuf>,
        files: Vec<PathBuf>,
        text: String,
    },
}

impl RunPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RunPayload::Text(_) => "text",
            RunPayload::Image(_) => "image",
            RunPayload::MediaGroup { .. } => "media_group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The busy indicator appeared and later cleared.
    Completed,
    /// The busy indicator never showed up within the wait ceiling.
    /// Either too fast to observe or already finished; not an error.
    NeverBusy,
    /// The monitor safety ceiling was reached while still busy.
    TimedOut,
    /// Stopped early; the reason was also reported as a status.
    Aborted(String),
}
