//! Per-kind rule state machines.
//!
//! Rules are pure decisions: they read the attempt's facts, update their own progress and
//! the outcome latch, and return what the session should do next. They never touch media
//! or timers directly.

pub mod brake;
pub mod speed_limit;
pub mod turn;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::level::{LevelDefinition, LevelRules, Side};
use crate::rate::RateChange;
use crate::settings::TimingSettings;

pub use brake::StopProgress;
pub use speed_limit::SpeedLimitProgress;
pub use turn::TurnProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Pending,
    Success,
    Early,
    Late,
    Wrong,
    NotTurned,
    NoIndicator,
    JumpedSignal,
    Overspeed,
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Pending => "",
            Self::Success => "Well done!",
            Self::Early => "Too early",
            Self::Late => "Too late",
            Self::Wrong => "Wrong direction",
            Self::NotTurned => "You missed the turn",
            Self::NoIndicator => "You turned without using the indicator",
            Self::JumpedSignal => "You jumped the red signal",
            Self::Overspeed => "You crossed the speed limit",
        }
    }
}

/// Two-phase outcome: rules may latch a verdict internally, the learner only sees it
/// once it is published (immediately for failures, at media end for deferred ones).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutcomeLatch {
    latched: Option<Outcome>,
    public: Outcome,
}

impl OutcomeLatch {
    pub fn public(&self) -> Outcome {
        self.public
    }

    pub fn latched(&self) -> Option<Outcome> {
        self.latched
    }

    pub fn is_terminal(&self) -> bool {
        self.public.is_terminal()
    }

    /// Records a deferred verdict. A latched failure is never replaced by success.
    pub fn latch(&mut self, outcome: Outcome) -> bool {
        if self.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        match self.latched {
            Some(current) if !current.is_success() => false,
            Some(current) if current == outcome => false,
            _ => {
                self.latched = Some(outcome);
                true
            }
        }
    }

    /// Makes `outcome` the public verdict. Only the first publish counts.
    pub fn publish(&mut self, outcome: Outcome) -> bool {
        if self.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        self.public = outcome;
        self.latched = Some(outcome);
        true
    }
}

/// Indicator and turn facts, as timestamps on the media timeline.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Signals {
    pub indicator: Option<Side>,
    pub indicator_at: Option<f64>,
    pub turn_side: Option<Side>,
    pub turn_at: Option<f64>,
}

impl Signals {
    /// Toggling the lit side turns it off; toggling the other side switches over.
    pub fn toggle_indicator(&mut self, side: Side, position: f64) {
        if self.indicator == Some(side) {
            self.indicator = None;
            self.indicator_at = None;
        } else {
            self.indicator = Some(side);
            self.indicator_at = Some(position);
        }
    }

    /// Only the first turn of an attempt is recorded.
    pub fn record_turn(&mut self, side: Side, position: f64) -> bool {
        if self.turn_at.is_some() {
            return false;
        }
        self.turn_side = Some(side);
        self.turn_at = Some(position);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleProgress {
    Brake,
    Stop(StopProgress),
    Turn(TurnProgress),
    SpeedLimit(SpeedLimitProgress),
}

impl RuleProgress {
    pub fn for_level(level: &LevelDefinition) -> Self {
        match level.rules {
            LevelRules::Brake { .. } => Self::Brake,
            LevelRules::Stop { .. } => Self::Stop(StopProgress::default()),
            LevelRules::Turn { .. } => Self::Turn(TurnProgress::default()),
            LevelRules::SpeedLimit { .. } => Self::SpeedLimit(SpeedLimitProgress::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleEvent {
    /// Media position moved.
    Tick,
    RateChanged(RateChange),
    SignalsChanged,
    MediaEnded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleDecision {
    Publish(Outcome),
    BeginStopWait { stopped_at: f64 },
    AbortStopWait,
    OverspeedAlert,
}

/// Everything a rule may read for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub level: &'a LevelDefinition,
    pub timing: &'a TimingSettings,
    pub now: Duration,
    pub position: f64,
    pub rate: f64,
    pub signals: &'a Signals,
}

pub fn evaluate(
    progress: &mut RuleProgress,
    latch: &mut OutcomeLatch,
    input: &RuleInput<'_>,
    event: RuleEvent,
) -> Vec<RuleDecision> {
    if latch.is_terminal() {
        return Vec::new();
    }
    match (&input.level.rules, progress) {
        (LevelRules::Brake { window }, RuleProgress::Brake) => {
            brake::evaluate_brake(window, latch, input, event)
        }
        (LevelRules::Stop { window, .. }, RuleProgress::Stop(stop)) => {
            brake::evaluate_stop(window, stop, latch, input, event)
        }
        (
            LevelRules::Turn {
                side,
                indicator_window,
                turn_window,
                turn_threshold,
            },
            RuleProgress::Turn(turn),
        ) => {
            let rules = turn::TurnRules {
                side: *side,
                indicator_window: *indicator_window,
                turn_window: *turn_window,
                threshold: turn_threshold.unwrap_or(turn_window.end),
            };
            turn::evaluate(&rules, turn, latch, input, event)
        }
        (
            LevelRules::SpeedLimit {
                window,
                speed_limit,
            },
            RuleProgress::SpeedLimit(speed),
        ) => speed_limit::evaluate(window, *speed_limit, speed, input, event),
        (_, progress) => {
            tracing::warn!(level = %input.level.id, ?progress, "rule progress does not match level kind");
            Vec::new()
        }
    }
}
