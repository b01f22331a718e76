pub mod aggregator;
pub mod chat;
pub mod config;
pub mod errors;
pub mod executor;
pub mod mcp;
pub mod perception;
pub mod transient;
pub mod workflow;

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::aggregator::buffer::BufferRegistry;
use crate::aggregator::service::MessageAggregator;
use crate::chat::telegram::TelegramClient;
use crate::errors::BridgeResult;
use crate::executor::input::XdotoolInjector;
use crate::mcp::server::McpServer;
use crate::perception::matcher::TemplateMatcher;
use crate::perception::screenshot::ScrotCapture;
use crate::perception::templates::TemplateSet;
use crate::perception::types::ColorTolerance;
use crate::workflow::engine::Orchestrator;

/// Stdout belongs to the tool server, so logs go to the configured file or stderr.
fn init_tracing(file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("debug,hyper_util=info,reqwest=info"));

    let log_file = file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                eprintln!("cannot open log file {}: {e}; logging to stderr", path.display());
                None
            }
        }
    });

    let _ = match log_file {
        Some(f) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(f))
            .try_init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
}

pub async fn run() -> BridgeResult<()> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let (config, source) = config::load_config()?;
    init_tracing(config.logging.file.as_deref());
    source.log();

    let token = config.require_token()?;
    let telegram = Arc::new(TelegramClient::new(&config.telegram, token)?);

    let templates_dir = config.templates_dir();
    tracing::info!(
        binary = ?std::env::current_exe().ok(),
        templates = %templates_dir.display(),
        display = %std::env::var("DISPLAY").unwrap_or_default(),
        "starting gravity bridge"
    );
    let templates = TemplateSet::from_config(&templates_dir, &config.templates);
    templates.log_missing();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(ScrotCapture::new()),
        Arc::new(XdotoolInjector::new(config.workflow.click_settle())),
        templates,
        TemplateMatcher::new(ColorTolerance::new(config.matcher.tolerance)),
        config.workflow.clone(),
    ));
    if config.workflow.serialize_runs {
        tracing::info!("automation runs are serialized");
    }

    let aggregator = MessageAggregator::new(
        Arc::new(BufferRegistry::new()),
        telegram.clone(),
        orchestrator,
        config.aggregator.clone(),
    );

    if config.mcp.enabled {
        let server = Arc::new(McpServer::new(telegram.clone()));
        tokio::spawn(async move {
            if let Err(e) = server.serve_stdio().await {
                tracing::error!(error = %e, "tool server stopped");
            }
        });
    }

    telegram
        .poll(move |message| {
            let aggregator = aggregator.clone();
            tokio::spawn(async move {
                aggregator.on_message(message).await;
            });
        })
        .await;
    Ok(())
}
