//! Short exclusive sequences that take the media away from the learner for a while:
//! the rule-violation warning with its resume countdown, and the red-signal wait.
//!
//! The scheduler only tracks which sequence is active and what to restore. The session
//! owns the timer queue and applies the media commands.

use std::time::Duration;

use engine::timers::TimerId;
use serde::{Deserialize, Serialize};

use crate::level::{Side, StopResume};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WarningReason {
    /// Steering or a turn button used on a level without a turn.
    SteeringNotAllowed,
    /// Turn button pressed for the side this level does not turn to.
    TurnNotAllowed { attempted: Side },
}

impl WarningReason {
    pub fn message(self) -> String {
        match self {
            Self::SteeringNotAllowed => "Steering is not allowed on this level".to_string(),
            Self::TurnNotAllowed { attempted } => {
                format!("A {} turn is not allowed here", attempted.label())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sequence", rename_all = "snake_case")]
pub enum Sequence {
    Warning {
        reason: WarningReason,
    },
    Countdown {
        #[serde(with = "crate::serde_duration")]
        ends_at: Duration,
    },
    StopWait {
        stopped_at: f64,
        #[serde(with = "crate::serde_duration")]
        ends_at: Duration,
        resume: StopResume,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Warning,
    Countdown,
    /// Waiting for the light to turn green (alternate clip follows).
    TrafficWait,
    /// Legacy red-light wait (seek follows).
    RedLightWait,
}

impl Sequence {
    pub fn kind(&self) -> SequenceKind {
        match self {
            Self::Warning { .. } => SequenceKind::Warning,
            Self::Countdown { .. } => SequenceKind::Countdown,
            Self::StopWait {
                resume: StopResume::SwapClip { .. },
                ..
            } => SequenceKind::TrafficWait,
            Self::StopWait {
                resume: StopResume::SkipTo { .. },
                ..
            } => SequenceKind::RedLightWait,
        }
    }

    fn ends_at(&self) -> Option<Duration> {
        match self {
            Self::Warning { .. } => None,
            Self::Countdown { ends_at } | Self::StopWait { ends_at, .. } => Some(*ends_at),
        }
    }
}

/// A stop wait that ran out: where to resume and how.
#[derive(Debug, Clone, PartialEq)]
pub struct StopWaitDone {
    pub stopped_at: f64,
    pub resume: StopResume,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceScheduler {
    active: Option<Sequence>,
    /// Rate to restore once a warning countdown completes.
    resume_rate: Option<f64>,
    deadline: Option<TimerId>,
}

impl SequenceScheduler {
    pub fn active(&self) -> Option<&Sequence> {
        self.active.as_ref()
    }

    pub fn kind(&self) -> Option<SequenceKind> {
        self.active.as_ref().map(Sequence::kind)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Warning and countdown freeze rule evaluation; the stop wait does not, so a
    /// learner who drives off early can still be caught.
    pub fn suspends_evaluation(&self) -> bool {
        matches!(
            self.kind(),
            Some(SequenceKind::Warning | SequenceKind::Countdown)
        )
    }

    pub fn deadline(&self) -> Option<TimerId> {
        self.deadline
    }

    /// Whole seconds left on a countdown or wait, rounded up.
    pub fn countdown_secs(&self, now: Duration) -> Option<u64> {
        let ends_at = self.active.as_ref()?.ends_at()?;
        let remaining = ends_at.saturating_sub(now).as_secs_f64();
        Some(remaining.ceil() as u64)
    }

    pub fn enter_warning(&mut self, reason: WarningReason, current_rate: f64) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(Sequence::Warning { reason });
        self.resume_rate = Some(current_rate);
        true
    }

    /// Continue after a warning. Returns `false` if no warning is showing.
    pub fn start_countdown(&mut self, ends_at: Duration, timer: TimerId) -> bool {
        if !matches!(self.active, Some(Sequence::Warning { .. })) {
            return false;
        }
        self.active = Some(Sequence::Countdown { ends_at });
        self.deadline = Some(timer);
        true
    }

    /// Countdown reached zero; returns the rate to restore.
    pub fn finish_countdown(&mut self) -> Option<f64> {
        if !matches!(self.active, Some(Sequence::Countdown { .. })) {
            return None;
        }
        self.active = None;
        self.deadline = None;
        Some(self.resume_rate.take().unwrap_or(0.0))
    }

    pub fn begin_stop_wait(
        &mut self,
        stopped_at: f64,
        resume: StopResume,
        ends_at: Duration,
        timer: TimerId,
    ) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(Sequence::StopWait {
            stopped_at,
            ends_at,
            resume,
        });
        self.deadline = Some(timer);
        true
    }

    pub fn finish_stop_wait(&mut self) -> Option<StopWaitDone> {
        match self.active.take() {
            Some(Sequence::StopWait {
                stopped_at, resume, ..
            }) => {
                self.deadline = None;
                Some(StopWaitDone { stopped_at, resume })
            }
            other => {
                self.active = other;
                None
            }
        }
    }

    /// Drops whatever is active. Returns the deadline timer for the caller to cancel.
    pub fn abort(&mut self) -> Option<TimerId> {
        self.active = None;
        self.resume_rate = None;
        self.deadline.take()
    }
}
