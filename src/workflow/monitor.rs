use std::path::PathBuf;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::WorkflowConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    AwaitingBusy,
    Monitoring,
    Done,
}

/// Result of feeding one busy-indicator check into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyVerdict {
    Present,
    /// Missing this tick, but the streak is still below the threshold.
    Missing { streak: u32 },
    /// The streak reached the threshold: the busy state is over.
    Gone,
}

/// Per-run bookkeeping for the two poll phases. Owned by exactly one run.
#[derive(Debug)]
pub struct MonitorSession {
    pub busy_template: PathBuf,
    pub accept_templates: Vec<PathBuf>,
    not_found_streak: u32,
    max_not_found: u32,
    last_status_at: Option<Instant>,
    pulse_interval: Duration,
    phase: MonitorPhase,
}

impl MonitorSession {
    pub fn new(busy_template: PathBuf, accept_templates: Vec<PathBuf>, config: &WorkflowConfig) -> Self {
        Self {
            busy_template,
            accept_templates,
            not_found_streak: 0,
            max_not_found: config.max_not_found.max(1),
            last_status_at: None,
            pulse_interval: config.pulse_interval(),
            phase: MonitorPhase::AwaitingBusy,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub fn not_found_streak(&self) -> u32 {
        self.not_found_streak
    }

    pub fn busy_appeared(&mut self) {
        self.phase = MonitorPhase::Monitoring;
    }

    pub fn finish(&mut self) {
        self.phase = MonitorPhase::Done;
    }

    /// Any sighting resets the streak, so brief detection flicker is absorbed.
    pub fn observe_busy(&mut self, found: bool) -> BusyVerdict {
        if found {
            self.not_found_streak = 0;
            return BusyVerdict::Present;
        }
        self.not_found_streak += 1;
        if self.not_found_streak >= self.max_not_found {
            self.phase = MonitorPhase::Done;
            BusyVerdict::Gone
        } else {
            BusyVerdict::Missing {
                streak: self.not_found_streak,
            }
        }
    }

    /// True when a status pulse should go out at `now`; records it if so.
    /// The first busy tick always pulses.
    pub fn take_pulse(&mut self, now: Instant) -> bool {
        let due = match self.last_status_at {
            None => true,
            Some(last) => now.duration_since(last) >= self.pulse_interval,
        };
        if due {
            self.last_status_at = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> MonitorSession {
        MonitorSession::new(PathBuf::from("busy.png"), vec![], &WorkflowConfig::default())
    }

    #[test]
    fn gone_exactly_on_threshold() {
        let mut s = session();
        s.busy_appeared();
        assert_eq!(s.observe_busy(true), BusyVerdict::Present);
        for streak in 1..5 {
            assert_eq!(s.observe_busy(false), BusyVerdict::Missing { streak });
            assert_eq!(s.phase(), MonitorPhase::Monitoring);
        }
        assert_eq!(s.observe_busy(false), BusyVerdict::Gone);
        assert_eq!(s.phase(), MonitorPhase::Done);
    }

    #[test]
    fn sighting_resets_streak() {
        let mut s = session();
        s.observe_busy(false);
        s.observe_busy(false);
        s.observe_busy(false);
        assert_eq!(s.not_found_streak(), 3);
        s.observe_busy(true);
        assert_eq!(s.not_found_streak(), 0);
        assert_eq!(s.observe_busy(false), BusyVerdict::Missing { streak: 1 });
    }

    #[test]
    fn zero_threshold_is_treated_as_one() {
        let config = WorkflowConfig {
            max_not_found: 0,
            ..WorkflowConfig::default()
        };
        let mut s = MonitorSession::new(PathBuf::from("busy.png"), vec![], &config);
        assert_eq!(s.observe_busy(false), BusyVerdict::Gone);
    }

    #[tokio::test(start_paused = true)]
    async fn pulses_at_most_once_per_interval() {
        let mut s = session();
        let start = Instant::now();
        let mut pulses = 0;
        // One check per second for 23 seconds of continuous busy.
        for sec in 0..=23u64 {
            if s.take_pulse(start + Duration::from_secs(sec)) {
                pulses += 1;
            }
        }
        assert_eq!(pulses, 23 / 5 + 1);
    }
}
