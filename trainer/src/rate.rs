use engine::timers::TimerId;
use serde::{Deserialize, Serialize};

use crate::media::MediaCommand;

pub const MAX_RATE: f64 = 2.0;
/// Slowest playback rate the media element is asked for while moving.
pub const MIN_PLAYBACK_RATE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlDirection {
    Accelerate,
    Brake,
}

impl ControlDirection {
    pub fn signum(self) -> f64 {
        match self {
            Self::Accelerate => 1.0,
            Self::Brake => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateChange {
    pub before: f64,
    pub after: f64,
    pub direction: Option<ControlDirection>,
}

impl RateChange {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }

    /// The vehicle came to rest because of this change.
    pub fn came_to_rest(&self) -> bool {
        self.before > 0.0 && self.after == 0.0
    }

    pub fn braked_to_rest(&self) -> bool {
        self.came_to_rest() && self.direction == Some(ControlDirection::Brake)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub direction: ControlDirection,
    pub timer: TimerId,
}

/// The virtual vehicle speed, expressed as a playback rate in `[0, 2]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateController {
    rate: f64,
    last_direction: Option<ControlDirection>,
    hold: Option<Hold>,
}

pub fn round_rate(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl RateController {
    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn last_direction(&self) -> Option<ControlDirection> {
        self.last_direction
    }

    pub fn hold(&self) -> Option<Hold> {
        self.hold
    }

    pub fn nudge(&mut self, delta: f64, direction: ControlDirection) -> RateChange {
        let before = self.rate;
        let delta = if delta.is_finite() { delta } else { 0.0 };
        self.rate = round_rate((self.rate + delta).clamp(0.0, MAX_RATE));
        if delta != 0.0 {
            self.last_direction = Some(direction);
        }
        RateChange {
            before,
            after: self.rate,
            direction: Some(direction),
        }
    }

    /// Pedal-magnitude nudge in the given direction.
    pub fn push(&mut self, direction: ControlDirection, amount: f64) -> RateChange {
        self.nudge(direction.signum() * amount.abs(), direction)
    }

    /// Sets the rate without touching the last control direction.
    pub fn force(&mut self, rate: f64) -> RateChange {
        let before = self.rate;
        let rate = if rate.is_finite() { rate } else { 0.0 };
        self.rate = round_rate(rate.clamp(0.0, MAX_RATE));
        RateChange {
            before,
            after: self.rate,
            direction: None,
        }
    }

    /// Returns the repeat timer of a hold that was replaced, so the caller can cancel it.
    pub fn begin_hold(&mut self, direction: ControlDirection, timer: TimerId) -> Option<TimerId> {
        self.hold
            .replace(Hold { direction, timer })
            .map(|previous| previous.timer)
    }

    pub fn end_hold(&mut self) -> Option<TimerId> {
        self.hold.take().map(|hold| hold.timer)
    }

    pub fn playback(&self) -> MediaCommand {
        playback_for(self.rate)
    }
}

pub fn playback_for(rate: f64) -> MediaCommand {
    if rate > 0.0 {
        MediaCommand::Play {
            rate: rate.clamp(MIN_PLAYBACK_RATE, MAX_RATE),
        }
    } else {
        MediaCommand::Pause
    }
}
