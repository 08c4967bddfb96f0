use serde::Serialize;

use crate::level::{HintCategory, LevelDefinition, Side};
use crate::rules::Outcome;
use crate::sequence::{Sequence, SequenceKind};
use crate::state::AttemptState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HintView {
    pub category: HintCategory,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceView {
    pub kind: SequenceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Whole seconds left, rounded up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown: Option<u64>,
}

/// What a render layer needs, derived from the attempt and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelView {
    pub level_id: String,
    pub attempt: u32,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_message: Option<&'static str>,
    pub rate: f64,
    pub speed_kmh: f64,
    pub clip: String,
    pub position: f64,
    pub hints: Vec<HintView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicator: Option<Side>,
    pub overspeed_flash: bool,
    pub resume_alert: bool,
    pub torn_down: bool,
}

impl LevelView {
    pub fn from_state(level: &LevelDefinition, state: &AttemptState) -> Self {
        let outcome = state.outcome();
        let hints = state
            .timeline
            .visible()
            .map(|category| HintView {
                category,
                text: hint_text(level, category),
            })
            .collect();

        let sequence = state.sequence.active().map(|active| SequenceView {
            kind: active.kind(),
            warning: match active {
                Sequence::Warning { reason } => Some(reason.message()),
                _ => None,
            },
            countdown: state.sequence.countdown_secs(state.clock),
        });

        Self {
            level_id: level.id.clone(),
            attempt: state.attempt,
            outcome,
            outcome_message: outcome.is_terminal().then(|| outcome.message()),
            rate: state.rate(),
            speed_kmh: level.speed_kmh(state.rate()).round(),
            clip: state.timeline.clip().to_string(),
            position: state.position(),
            hints,
            sequence,
            indicator: state.signals.indicator,
            overspeed_flash: state.alerts.overspeed_flash.is_some(),
            resume_alert: state.alerts.resume_alert.is_some(),
            torn_down: state.torn_down,
        }
    }
}

/// Banner text: the level's own hint for its main window, the announcement otherwise.
fn hint_text(level: &LevelDefinition, category: HintCategory) -> String {
    match category {
        HintCategory::Brake | HintCategory::Stop if !level.hint.is_empty() => level.hint.clone(),
        _ => level.announcement(category),
    }
}
