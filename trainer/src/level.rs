//! Level definitions: which action a level asks for, and when.
//!
//! All times are media positions in seconds. A level is immutable once loaded; every
//! attempt reads it and never writes it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// `[start, end]` in media seconds, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl From<(f64, f64)> for TimeWindow {
    fn from((start, end): (f64, f64)) -> Self {
        Self { start, end }
    }
}

impl From<TimeWindow> for (f64, f64) {
    fn from(w: TimeWindow) -> Self {
        (w.start, w.end)
    }
}

impl TimeWindow {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Hint visibility: `start <= t < end`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Action evaluation: `start <= t <= end`.
    pub fn contains_inclusive(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn is_before(&self, t: f64) -> bool {
        t < self.start
    }

    pub fn is_after(&self, t: f64) -> bool {
        t > self.end
    }

    fn validate(&self, level: &str, name: &str) -> Result<()> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(TrainerError::invalid(level, format!("{name} window is not finite")));
        }
        if self.start < 0.0 {
            return Err(TrainerError::invalid(level, format!("{name} window starts before 0")));
        }
        if self.start >= self.end {
            return Err(TrainerError::invalid(
                level,
                format!("{name} window start {} is not before end {}", self.start, self.end),
            ));
        }
        Ok(())
    }
}

/// What happens once the learner has waited out a red signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StopResume {
    /// Signal turns green: load the alternate clip at the captured position.
    SwapClip { clip: String },
    /// Seek the current clip to a fixed position.
    SkipTo { position: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelRules {
    Brake {
        window: TimeWindow,
    },
    Stop {
        window: TimeWindow,
        resume: StopResume,
    },
    Turn {
        side: Side,
        indicator_window: TimeWindow,
        turn_window: TimeWindow,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn_threshold: Option<f64>,
    },
    SpeedLimit {
        window: TimeWindow,
        speed_limit: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Brake,
    Stop,
    Turn,
    SpeedLimit,
}

impl LevelKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Brake => "brake",
            Self::Stop => "stop",
            Self::Turn => "turn",
            Self::SpeedLimit => "speed_limit",
        }
    }
}

/// Named hint windows. Each category is announced at most once per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintCategory {
    Brake,
    Stop,
    Indicator,
    Turn,
    SpeedLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelDefinition {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub hint: String,
    pub clip: String,
    #[serde(flatten)]
    pub rules: LevelRules,
    #[serde(default = "default_speed_multiplier")]
    pub speed_multiplier: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    #[serde(default)]
    pub vibration_stamps: Vec<f64>,
    pub video_end: f64,
}

fn default_speed_multiplier() -> f64 {
    100.0
}

fn default_max_speed() -> f64 {
    200.0
}

impl LevelDefinition {
    pub fn kind(&self) -> LevelKind {
        match self.rules {
            LevelRules::Brake { .. } => LevelKind::Brake,
            LevelRules::Stop { .. } => LevelKind::Stop,
            LevelRules::Turn { .. } => LevelKind::Turn,
            LevelRules::SpeedLimit { .. } => LevelKind::SpeedLimit,
        }
    }

    /// Steering and turn buttons only make sense on turn levels.
    pub fn allows_turning(&self) -> bool {
        self.kind() == LevelKind::Turn
    }

    pub fn speed_kmh(&self, rate: f64) -> f64 {
        rate * self.speed_multiplier
    }

    pub fn hint_windows(&self) -> Vec<(HintCategory, TimeWindow)> {
        match &self.rules {
            LevelRules::Brake { window } => vec![(HintCategory::Brake, *window)],
            LevelRules::Stop { window, .. } => vec![(HintCategory::Stop, *window)],
            LevelRules::Turn {
                indicator_window,
                turn_window,
                ..
            } => vec![
                (HintCategory::Indicator, *indicator_window),
                (HintCategory::Turn, *turn_window),
            ],
            LevelRules::SpeedLimit { window, .. } => vec![(HintCategory::SpeedLimit, *window)],
        }
    }

    /// Spoken text for the first entry into a hint window.
    pub fn announcement(&self, category: HintCategory) -> String {
        match (category, &self.rules) {
            (HintCategory::Brake, _) => "Brake now".to_string(),
            (HintCategory::Stop, _) => "Stop now".to_string(),
            (HintCategory::Indicator, LevelRules::Turn { side, .. }) => {
                format!("Turn on {} indicator now", side.label())
            }
            (HintCategory::Turn, LevelRules::Turn { side, .. }) => {
                format!("Take {} turn now", side.label())
            }
            (HintCategory::SpeedLimit, LevelRules::SpeedLimit { speed_limit, .. }) => {
                format!("Speed limit is {} kilometers per hour", speed_limit.round())
            }
            (HintCategory::Indicator, _) => "Turn on indicator now".to_string(),
            (HintCategory::Turn, _) => "Take the turn now".to_string(),
            (HintCategory::SpeedLimit, _) => "Watch your speed".to_string(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let id = self.id.as_str();
        if id.trim().is_empty() {
            return Err(TrainerError::invalid("<unnamed>", "level id is empty"));
        }
        if self.clip.trim().is_empty() {
            return Err(TrainerError::invalid(id, "clip is empty"));
        }
        if !self.video_end.is_finite() || self.video_end <= 0.0 {
            return Err(TrainerError::invalid(id, "video_end must be positive"));
        }
        if !self.speed_multiplier.is_finite() || self.speed_multiplier <= 0.0 {
            return Err(TrainerError::invalid(id, "speed_multiplier must be positive"));
        }
        if self.vibration_stamps.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(TrainerError::invalid(id, "vibration stamps must be finite and non-negative"));
        }

        match &self.rules {
            LevelRules::Brake { window } => window.validate(id, "brake")?,
            LevelRules::Stop { window, resume } => {
                window.validate(id, "stop")?;
                match resume {
                    StopResume::SwapClip { clip } if clip.trim().is_empty() => {
                        return Err(TrainerError::invalid(id, "resume clip is empty"));
                    }
                    StopResume::SkipTo { position } if !position.is_finite() || *position < 0.0 => {
                        return Err(TrainerError::invalid(id, "resume position must be non-negative"));
                    }
                    _ => {}
                }
            }
            LevelRules::Turn {
                indicator_window,
                turn_window,
                turn_threshold,
                ..
            } => {
                indicator_window.validate(id, "indicator")?;
                turn_window.validate(id, "turn")?;
                if let Some(threshold) = turn_threshold {
                    if !threshold.is_finite() || *threshold < 0.0 {
                        return Err(TrainerError::invalid(id, "turn threshold must be non-negative"));
                    }
                }
            }
            LevelRules::SpeedLimit {
                window,
                speed_limit,
            } => {
                window.validate(id, "speed limit")?;
                if !speed_limit.is_finite() || *speed_limit <= 0.0 {
                    return Err(TrainerError::invalid(id, "speed_limit must be positive"));
                }
            }
        }
        Ok(())
    }
}
