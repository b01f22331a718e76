use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, BridgeResult};

pub const CONFIG_FILE: &str = "config.toml";
pub const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Falls back to the TELEGRAM_BOT_TOKEN environment variable when empty.
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_api_base(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".into()
}

fn default_poll_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Relative paths resolve against the executable's directory.
    #[serde(default = "default_templates_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_input_surface")]
    pub input_surface: String,
    #[serde(default = "default_busy")]
    pub busy: String,
    /// Checked in order each busy tick; files that do not exist are skipped.
    #[serde(default = "default_accept")]
    pub accept: Vec<String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            dir: default_templates_dir(),
            input_surface: default_input_surface(),
            busy: default_busy(),
            accept: default_accept(),
        }
    }
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_input_surface() -> String {
    "input_box.png".into()
}

fn default_busy() -> String {
    "Replying.png".into()
}

fn default_accept() -> Vec<String> {
    vec!["accept_button.png".into(), "accept_all.png".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Per-channel absolute difference on the 8-bit scale; a channel matches when `diff < tolerance`.
    #[serde(default = "default_tolerance")]
    pub tolerance: u8,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
        }
    }
}

fn default_tolerance() -> u8 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_paste_settle_ms")]
    pub paste_settle_ms: u64,
    #[serde(default = "default_caption_settle_ms")]
    pub caption_settle_ms: u64,
    #[serde(default = "default_submit_gap_ms")]
    pub submit_gap_ms: u64,
    #[serde(default = "default_stabilize_ms")]
    pub stabilize_ms: u64,
    #[serde(default = "default_click_settle_ms")]
    pub click_settle_ms: u64,
    #[serde(default = "default_busy_poll_ms")]
    pub busy_poll_ms: u64,
    #[serde(default = "default_busy_wait_ceiling_ms")]
    pub busy_wait_ceiling_ms: u64,
    #[serde(default = "default_monitor_poll_ms")]
    pub monitor_poll_ms: u64,
    #[serde(default = "default_monitor_ceiling_secs")]
    pub monitor_ceiling_secs: u64,
    /// Consecutive busy-indicator misses before the busy state counts as over.
    #[serde(default = "default_max_not_found")]
    pub max_not_found: u32,
    #[serde(default = "default_pulse_interval_ms")]
    pub pulse_interval_ms: u64,
    #[serde(default = "default_paste_key")]
    pub paste_key: String,
    #[serde(default = "default_submit_key")]
    pub submit_key: String,
    #[serde(default = "default_input_click_offset")]
    pub input_click_offset: [i32; 2],
    /// Window title pattern raised before the input surface is located.
    #[serde(default)]
    pub window_name: Option<String>,
    /// Run at most one automation run at a time across all conversations.
    #[serde(default)]
    pub serialize_runs: bool,
    #[serde(default = "default_status_text")]
    pub status_text: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            paste_settle_ms: default_paste_settle_ms(),
            caption_settle_ms: default_caption_settle_ms(),
            submit_gap_ms: default_submit_gap_ms(),
            stabilize_ms: default_stabilize_ms(),
            click_settle_ms: default_click_settle_ms(),
            busy_poll_ms: default_busy_poll_ms(),
            busy_wait_ceiling_ms: default_busy_wait_ceiling_ms(),
            monitor_poll_ms: default_monitor_poll_ms(),
            monitor_ceiling_secs: default_monitor_ceiling_secs(),
            max_not_found: default_max_not_found(),
            pulse_interval_ms: default_pulse_interval_ms(),
            paste_key: default_paste_key(),
            submit_key: default_submit_key(),
            input_click_offset: default_input_click_offset(),
            window_name: None,
            serialize_runs: false,
            status_text: default_status_text(),
        }
    }
}

impl WorkflowConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn paste_settle(&self) -> Duration {
        Duration::from_millis(self.paste_settle_ms)
    }

    pub fn caption_settle(&self) -> Duration {
        Duration::from_millis(self.caption_settle_ms)
    }

    pub fn submit_gap(&self) -> Duration {
        Duration::from_millis(self.submit_gap_ms)
    }

    pub fn stabilize(&self) -> Duration {
        Duration::from_millis(self.stabilize_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn busy_poll(&self) -> Duration {
        Duration::from_millis(self.busy_poll_ms)
    }

    pub fn busy_wait_ceiling(&self) -> Duration {
        Duration::from_millis(self.busy_wait_ceiling_ms)
    }

    pub fn monitor_poll(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_ms)
    }

    pub fn monitor_ceiling(&self) -> Duration {
        Duration::from_secs(self.monitor_ceiling_secs)
    }

    pub fn pulse_interval(&self) -> Duration {
        Duration::from_millis(self.pulse_interval_ms)
    }
}

fn default_settle_ms() -> u64 {
    500
}

fn default_paste_settle_ms() -> u64 {
    500
}

fn default_caption_settle_ms() -> u64 {
    300
}

fn default_submit_gap_ms() -> u64 {
    200
}

fn default_stabilize_ms() -> u64 {
    2000
}

fn default_click_settle_ms() -> u64 {
    100
}

fn default_busy_poll_ms() -> u64 {
    500
}

fn default_busy_wait_ceiling_ms() -> u64 {
    10_000
}

fn default_monitor_poll_ms() -> u64 {
    1000
}

fn default_monitor_ceiling_secs() -> u64 {
    300
}

fn default_max_not_found() -> u32 {
    5
}

fn default_pulse_interval_ms() -> u64 {
    5000
}

fn default_paste_key() -> String {
    "ctrl+v".into()
}

fn default_submit_key() -> String {
    "Return".into()
}

fn default_input_click_offset() -> [i32; 2] {
    [10, 10]
}

fn default_status_text() -> String {
    "Thinking...".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
    /// Used in the context prefix of every composed batch.
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            quiescence_ms: default_quiescence_ms(),
            source_label: default_source_label(),
        }
    }
}

impl AggregatorConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }
}

fn default_quiescence_ms() -> u64 {
    2000
}

fn default_source_label() -> String {
    "Telegram".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file; stderr is used when unset or not writable.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn resolve_config_path() -> Option<PathBuf> {
    let beside_exe = executable_dir().map(|dir| dir.join(CONFIG_FILE));
    let working_dir = std::env::current_dir().ok().map(|cwd| cwd.join(CONFIG_FILE));
    let user_dir = dirs::config_dir().map(|dir| dir.join("gravity-bridge").join(CONFIG_FILE));

    [beside_exe, working_dir, user_dir]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.exists())
}

pub fn parse_config(content: &str) -> BridgeResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

/// Where the active configuration came from.
///
/// Config is read before the log destination is known, so the outcome is
/// returned and logged by the caller once tracing is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => tracing::info!(path = %path.display(), "config loaded"),
            ConfigSource::Defaults => tracing::warn!("config.toml not found; using built-in defaults"),
        }
    }
}

/// Loads `config.toml` if one exists, otherwise built-in defaults.
/// The bot token from the environment wins over the file.
pub fn load_config() -> BridgeResult<(AppConfig, ConfigSource)> {
    load_config_from(resolve_config_path())
}

fn load_config_from(path: Option<PathBuf>) -> BridgeResult<(AppConfig, ConfigSource)> {
    let (mut config, source) = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            (parse_config(&content)?, ConfigSource::File(path))
        }
        None => (AppConfig::default(), ConfigSource::Defaults),
    };

    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            config.telegram.bot_token = token;
        }
    }
    Ok((config, source))
}

impl AppConfig {
    pub fn require_token(&self) -> BridgeResult<&str> {
        let token = self.telegram.bot_token.trim();
        if token.is_empty() {
            return Err(BridgeError::Config(format!("{TOKEN_ENV} not set")));
        }
        Ok(token)
    }

    /// Absolute templates directory.
    pub fn templates_dir(&self) -> PathBuf {
        let dir = &self.templates.dir;
        if dir.is_absolute() {
            return dir.clone();
        }
        match executable_dir() {
            Some(base) => base.join(dir),
            None => dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_constants() {
        let config = AppConfig::default();
        assert_eq!(config.matcher.tolerance, 30);
        assert_eq!(config.aggregator.quiescence(), Duration::from_secs(2));
        assert_eq!(config.workflow.max_not_found, 5);
        assert_eq!(config.workflow.pulse_interval(), Duration::from_secs(5));
        assert_eq!(config.workflow.monitor_ceiling(), Duration::from_secs(300));
        assert_eq!(config.workflow.busy_wait_ceiling(), Duration::from_secs(10));
        assert_eq!(config.templates.busy, "Replying.png");
        assert!(!config.workflow.serialize_runs);
        assert!(config.mcp.enabled);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = parse_config(
            r#"
            [workflow]
            max_not_found = 3
            window_name = "antigravity"

            [aggregator]
            quiescence_ms = 4000
            "#,
        )
        .unwrap();
        assert_eq!(config.workflow.max_not_found, 3);
        assert_eq!(config.workflow.window_name.as_deref(), Some("antigravity"));
        assert_eq!(config.workflow.monitor_poll_ms, 1000);
        assert_eq!(config.aggregator.quiescence_ms, 4000);
        assert_eq!(config.aggregator.source_label, "Telegram");
        assert_eq!(config.templates.accept.len(), 2);
    }

    #[test]
    fn empty_token_is_a_config_error() {
        let config = AppConfig::default();
        assert!(matches!(config.require_token(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn load_reports_where_config_came_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[matcher]\ntolerance = 12\n").unwrap();

        let (config, source) = load_config_from(Some(path.clone())).unwrap();
        assert_eq!(config.matcher.tolerance, 12);
        assert_eq!(source, ConfigSource::File(path));

        let (config, source) = load_config_from(None).unwrap();
        assert_eq!(config.matcher.tolerance, 30);
        assert_eq!(source, ConfigSource::Defaults);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_config_warning_reaches_the_subscriber() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || ConfigSource::Defaults.log());

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("using built-in defaults"), "{output}");
    }

    #[test]
    fn absolute_templates_dir_is_kept() {
        let mut config = AppConfig::default();
        config.templates.dir = PathBuf::from("/opt/bridge/templates");
        assert_eq!(config.templates_dir(), PathBuf::from("/opt/bridge/templates"));
    }
}
