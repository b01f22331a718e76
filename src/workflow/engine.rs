use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::sync::Mutex;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::Instrument;

use crate::config::WorkflowConfig;
use crate::executor::input::InputInjector;
use crate::perception::matcher::TemplateMatcher;
use crate::perception::pipeline::{find_first, find_template};
use crate::perception::screenshot::ScreenCapture;
use crate::perception::templates::{display_name, TemplateSet};
use crate::workflow::monitor::{BusyVerdict, MonitorSession};
use crate::workflow::state::{RunOutcome, RunPayload, WorkflowState};
use crate::workflow::status::StatusNotifier;

/// Runs one payload through the target application and reports back.
/// A run cannot be cancelled; it ends only through its own exits.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run(&self, payload: RunPayload, notifier: Arc<dyn StatusNotifier>) -> RunOutcome;
}

pub struct Orchestrator {
    screen: Arc<dyn ScreenCapture>,
    input: Arc<dyn InputInjector>,
    templates: TemplateSet,
    matcher: TemplateMatcher,
    config: WorkflowConfig,
    /// Present only when `serialize_runs` is on: one run at a time, process-wide.
    run_gate: Option<Mutex<()>>,
}

/// One poll tick's view of the busy indicator.
enum BusyCheck {
    /// Carries the capture so the accept check can reuse it.
    Busy(Arc<DynamicImage>),
    Clear,
    /// Capture failed; the tick is skipped.
    Skipped,
}

impl Orchestrator {
    pub fn new(
        screen: Arc<dyn ScreenCapture>,
        input: Arc<dyn InputInjector>,
        templates: TemplateSet,
        matcher: TemplateMatcher,
        config: WorkflowConfig,
    ) -> Self {
        let run_gate = config.serialize_runs.then(|| Mutex::new(()));
        Self {
            screen,
            input,
            templates,
            matcher,
            config,
            run_gate,
        }
    }

    async fn drive(&self, payload: RunPayload, notifier: &dyn StatusNotifier) -> RunOutcome {
        let mut session = MonitorSession::new(
            self.templates.busy.clone(),
            self.templates.accept.clone(),
            &self.config,
        );
        let mut state = WorkflowState::Idle;

        loop {
            match state.clone() {
                WorkflowState::Idle => {
                    tracing::info!("Idle → PlacingContent");
                    state = WorkflowState::PlacingContent;
                }

                WorkflowState::PlacingContent => match self.place_content(&payload, notifier).await {
                    Ok(()) => {
                        tracing::info!("PlacingContent → Submitting");
                        state = WorkflowState::Submitting;
                    }
                    Err(reason) => {
                        tracing::error!(reason = %reason, "PlacingContent → Done (aborted)");
                        notifier.notify(&reason);
                        state = WorkflowState::Done {
                            outcome: RunOutcome::Aborted(reason),
                        };
                    }
                },

                WorkflowState::Submitting => {
                    self.submit(&payload).await;
                    tracing::info!("Submitting → AwaitingBusy");
                    state = WorkflowState::AwaitingBusy;
                }

                WorkflowState::AwaitingBusy => {
                    state = match self.await_busy(&mut session).await {
                        Ok(true) => {
                            tracing::info!("AwaitingBusy → Monitoring");
                            WorkflowState::Monitoring
                        }
                        Ok(false) => {
                            tracing::info!("busy indicator never appeared; AwaitingBusy → Done");
                            WorkflowState::Done {
                                outcome: RunOutcome::NeverBusy,
                            }
                        }
                        Err(reason) => {
                            tracing::error!(reason = %reason, "AwaitingBusy → Done (aborted)");
                            notifier.notify(&reason);
                            WorkflowState::Done {
                                outcome: RunOutcome::Aborted(reason),
                            }
                        }
                    };
                }

                WorkflowState::Monitoring => {
                    let outcome = self.monitor(&mut session, notifier).await;
                    tracing::info!(?outcome, "Monitoring → Done");
                    state = WorkflowState::Done { outcome };
                }

                WorkflowState::Done { outcome } => {
                    session.finish();
                    tracing::info!(?outcome, "run finished");
                    return outcome;
                }
            }
        }
    }

    // ── PlacingContent ──────────────────────────────────────────────────────

    async fn place_content(&self, payload: &RunPayload, notifier: &dyn StatusNotifier) -> Result<(), String> {
        match payload {
            RunPayload::Text(text) => {
                self.input
                    .set_clipboard_text(text)
                    .await
                    .map_err(|e| format!("Error setting clipboard: {e}"))?;
                self.focus_input_surface().await?;
                sleep(self.config.settle()).await;
            }

            RunPayload::Image(path) => {
                self.input
                    .set_clipboard_image(path)
                    .await
                    .map_err(|e| format!("Error setting clipboard image: {e}"))?;
                self.focus_input_surface().await?;
            }

            RunPayload::MediaGroup { images, files, text } => {
                self.focus_input_surface().await?;

                let settle = self.config.paste_settle();
                for (i, path) in images.iter().enumerate() {
                    tracing::info!(item = i + 1, total = images.len(), path = %path.display(), "staging image");
                    if let Err(e) = self.input.set_clipboard_image(path).await {
                        tracing::warn!(path = %path.display(), error = %e, "clipboard image failed; skipping");
                        notifier.notify(&format!("Error setting clipboard image {}: {e}", i + 1));
                        continue;
                    }
                    self.paste_with_settle(settle).await;
                }

                for path in files {
                    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.clone());
                    let reference = format!("@{}", absolute.display());
                    tracing::info!(reference = %reference, "staging file reference");
                    if let Err(e) = self.input.set_clipboard_text(&reference).await {
                        tracing::warn!(error = %e, "clipboard file reference failed; skipping");
                        notifier.notify(&format!("Error setting clipboard file {}: {e}", display_name(path)));
                        continue;
                    }
                    self.paste_with_settle(settle).await;
                }

                if !text.is_empty() {
                    match self.input.set_clipboard_text(text).await {
                        Ok(()) => self.paste_with_settle(self.config.caption_settle()).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "clipboard text failed; caption skipped");
                            notifier.notify(&format!("Error setting clipboard text: {e}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Raises the target window if configured, then clicks into the input surface.
    /// Not finding the surface is the one placement failure that always aborts.
    async fn focus_input_surface(&self) -> Result<(), String> {
        if let Some(pattern) = &self.config.window_name {
            match self.input.activate_window(pattern).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!(pattern = %pattern, "target window not found"),
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "window activation failed"),
            }
        }

        let path = &self.templates.input_surface;
        let name = display_name(path);
        let display = std::env::var("DISPLAY").unwrap_or_default();

        let info = match self.screen.capture().await {
            Err(e) => format!("DISPLAY: {display}. {e}"),
            Ok(screen) => {
                let size = format!("{}x{}", screen.width(), screen.height());
                match find_template(Arc::new(screen), path, self.matcher).await {
                    Ok(Some(at)) => {
                        let [dx, dy] = self.config.input_click_offset;
                        let (x, y) = at.offset(dx, dy);
                        tracing::info!(template = %name, x, y, "input surface found");
                        self.click(x, y).await;
                        return Ok(());
                    }
                    Ok(None) => format!("DISPLAY: {display}. Screen: {size}. Image match failed."),
                    Err(e) => format!("DISPLAY: {display}. Screen: {size}. {e}"),
                }
            }
        };
        Err(format!("Error: {name} not found. Info: {info}"))
    }

    // ── Submitting ──────────────────────────────────────────────────────────

    async fn submit(&self, payload: &RunPayload) {
        match payload {
            RunPayload::MediaGroup { .. } => {
                tracing::info!(wait = ?self.config.stabilize(), "waiting for uploads to stabilize");
                sleep(self.config.stabilize()).await;
                self.press(&self.config.submit_key).await;
            }
            RunPayload::Text(_) | RunPayload::Image(_) => {
                self.press(&self.config.paste_key).await;
                sleep(self.config.submit_gap()).await;
                self.press(&self.config.submit_key).await;
            }
        }
    }

    // ── AwaitingBusy / Monitoring ───────────────────────────────────────────

    /// `Ok(false)` when the ceiling passes without a sighting.
    async fn await_busy(&self, session: &mut MonitorSession) -> Result<bool, String> {
        let deadline = sleep(self.config.busy_wait_ceiling());
        tokio::pin!(deadline);
        let mut ticker = poll_ticker(self.config.busy_poll());

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => return Ok(false),
                _ = ticker.tick() => match self.check_busy(session).await? {
                    BusyCheck::Busy(_) => {
                        session.busy_appeared();
                        return Ok(true);
                    }
                    BusyCheck::Clear | BusyCheck::Skipped => {}
                },
            }
        }
    }

    async fn monitor(&self, session: &mut MonitorSession, notifier: &dyn StatusNotifier) -> RunOutcome {
        let ceiling = self.config.monitor_ceiling();
        let deadline = sleep(ceiling);
        tokio::pin!(deadline);
        let mut ticker = poll_ticker(self.config.monitor_poll());

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    tracing::warn!(ceiling = ?ceiling, "safety ceiling reached while still busy");
                    notifier.notify(&format!(
                        "Timed out after {}s waiting for the reply to finish.",
                        ceiling.as_secs()
                    ));
                    return RunOutcome::TimedOut;
                }
                _ = ticker.tick() => {
                    let check = match self.check_busy(session).await {
                        Ok(check) => check,
                        Err(reason) => {
                            tracing::error!(reason = %reason, "monitor loop stopped");
                            notifier.notify(&reason);
                            return RunOutcome::Aborted(reason);
                        }
                    };

                    let screen = match check {
                        BusyCheck::Skipped => continue,
                        BusyCheck::Clear => {
                            if session.observe_busy(false) == BusyVerdict::Gone {
                                tracing::info!(streak = session.not_found_streak(), "busy indicator gone");
                                return RunOutcome::Completed;
                            }
                            tracing::debug!(
                                streak = session.not_found_streak(),
                                max = self.config.max_not_found,
                                "busy indicator not found"
                            );
                            continue;
                        }
                        BusyCheck::Busy(screen) => {
                            session.observe_busy(true);
                            screen
                        }
                    };

                    if session.take_pulse(Instant::now()) {
                        tracing::debug!("status pulse");
                        notifier.notify(&self.config.status_text);
                    }
                    self.click_accept(screen, session).await;
                }
            }
        }
    }

    /// Captures once and checks the busy indicator on it.
    /// Failing to load the busy template stops the poll phases.
    async fn check_busy(&self, session: &MonitorSession) -> Result<BusyCheck, String> {
        let screen = match self.screen.capture().await {
            Ok(img) => Arc::new(img),
            Err(e) => {
                tracing::warn!(error = %e, "capture failed; skipping tick");
                return Ok(BusyCheck::Skipped);
            }
        };

        match find_template(screen.clone(), &session.busy_template, self.matcher).await {
            Ok(Some(_)) => Ok(BusyCheck::Busy(screen)),
            Ok(None) => Ok(BusyCheck::Clear),
            Err(e) => Err(format!(
                "Error loading {}: {e}",
                display_name(&session.busy_template)
            )),
        }
    }

    /// Clicks the first accept indicator on screen, if any. Monitoring goes on
    /// either way; the indicator showing up again later is expected.
    async fn click_accept(&self, screen: Arc<DynamicImage>, session: &MonitorSession) {
        if let Some((path, at)) = find_first(screen, &session.accept_templates, self.matcher).await {
            let (x, y) = at.center();
            tracing::info!(template = %display_name(&path), x, y, "accept indicator found; clicking");
            self.click(x, y).await;
        }
    }

    // ── Input helpers: failures are logged, never fatal ─────────────────────

    async fn click(&self, x: i32, y: i32) {
        if let Err(e) = self.input.click(x, y).await {
            tracing::warn!(x, y, error = %e, "click failed");
        }
    }

    async fn press(&self, combo: &str) {
        if let Err(e) = self.input.key(combo).await {
            tracing::warn!(combo, error = %e, "key press failed");
        }
    }

    async fn paste_with_settle(&self, settle: Duration) {
        sleep(settle).await;
        self.press(&self.config.paste_key).await;
        sleep(settle).await;
    }
}

fn poll_ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[async_trait]
impl WorkflowRunner for Orchestrator {
    async fn run(&self, payload: RunPayload, notifier: Arc<dyn StatusNotifier>) -> RunOutcome {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!("run", run_id = %&run_id[..8], kind = payload.kind());

        async move {
            let _serialized = match &self.run_gate {
                Some(gate) => {
                    tracing::debug!("waiting for run gate");
                    Some(gate.lock().await)
                }
                None => None,
            };
            self.drive(payload, notifier.as_ref()).await
        }
        .instrument(span)
        .await
    }
}
