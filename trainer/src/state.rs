use std::time::Duration;

use engine::timers::{TimerId, TimerQueue};
use serde::{Deserialize, Serialize};

use crate::input::InputNormalizer;
use crate::level::LevelDefinition;
use crate::rate::RateController;
use crate::rules::{Outcome, OutcomeLatch, RuleProgress, Signals};
use crate::sequence::SequenceScheduler;
use crate::timeline::TimelineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    HoldRepeat,
    /// End of the warning countdown or the stop wait.
    SequenceDeadline,
    ResumeAlertEnd,
    OverspeedFlashEnd,
}

/// Transient on-screen alerts with their expiry timers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alerts {
    pub overspeed_flash: Option<TimerId>,
    pub resume_alert: Option<TimerId>,
}

/// Everything one play-through of a level owns. Retry replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptState {
    pub attempt: u32,
    /// Latest wall-clock time seen on an input.
    #[serde(with = "crate::serde_duration")]
    pub clock: Duration,
    pub drive: RateController,
    pub timeline: TimelineState,
    pub signals: Signals,
    pub rules: RuleProgress,
    pub verdict: OutcomeLatch,
    pub sequence: SequenceScheduler,
    pub timers: TimerQueue<TimerKind>,
    pub alerts: Alerts,
    pub input: InputNormalizer,
    /// Media finished while evaluation was suspended; judged once it resumes.
    pub media_end_deferred: bool,
    pub recorded: bool,
    pub torn_down: bool,
}

impl AttemptState {
    pub fn new(level: &LevelDefinition, attempt: u32) -> Self {
        Self {
            attempt,
            clock: Duration::ZERO,
            drive: RateController::default(),
            timeline: TimelineState::new(&level.clip),
            signals: Signals::default(),
            rules: RuleProgress::for_level(level),
            verdict: OutcomeLatch::default(),
            sequence: SequenceScheduler::default(),
            timers: TimerQueue::new(),
            alerts: Alerts::default(),
            input: InputNormalizer::default(),
            media_end_deferred: false,
            recorded: false,
            torn_down: false,
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.verdict.public()
    }

    pub fn rate(&self) -> f64 {
        self.drive.rate()
    }

    pub fn position(&self) -> f64 {
        self.timeline.position()
    }
}
