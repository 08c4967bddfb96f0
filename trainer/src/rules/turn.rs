use serde::{Deserialize, Serialize};

use super::{Outcome, OutcomeLatch, RuleDecision, RuleEvent, RuleInput, Signals};
use crate::level::{Side, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnRules {
    pub side: Side,
    pub indicator_window: TimeWindow,
    pub turn_window: TimeWindow,
    /// Past this position with no turn taken, the turn was missed.
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TurnProgress {
    pub turned_without_indicator: bool,
}

pub fn evaluate(
    rules: &TurnRules,
    progress: &mut TurnProgress,
    latch: &mut OutcomeLatch,
    input: &RuleInput<'_>,
    event: RuleEvent,
) -> Vec<RuleDecision> {
    if event == RuleEvent::MediaEnded {
        let outcome = if progress.turned_without_indicator {
            Outcome::NoIndicator
        } else {
            latch.latched().unwrap_or(Outcome::Late)
        };
        return vec![RuleDecision::Publish(outcome)];
    }

    classify(rules, progress, latch, input.signals, input.position)
        .map(|outcome| vec![RuleDecision::Publish(outcome)])
        .unwrap_or_default()
}

/// Returns an outcome to publish now, if any.
fn classify(
    rules: &TurnRules,
    progress: &mut TurnProgress,
    latch: &mut OutcomeLatch,
    signals: &Signals,
    position: f64,
) -> Option<Outcome> {
    let wrong = rules.side.opposite();
    if signals.turn_side == Some(wrong) || signals.indicator == Some(wrong) {
        return Some(Outcome::Wrong);
    }
    if latch.latched().is_some() {
        return None;
    }

    if signals.turn_at.is_some() {
        match signals.indicator_at {
            None => {
                progress.turned_without_indicator = true;
                return None;
            }
            // Signalling after an unsignalled turn only counts inside the indicator window.
            Some(at) if progress.turned_without_indicator => {
                if !rules.indicator_window.contains_inclusive(at) {
                    return None;
                }
                progress.turned_without_indicator = false;
            }
            Some(_) => {}
        }
    } else if position >= rules.threshold {
        return Some(Outcome::NotTurned);
    }

    let (Some(indicator_at), Some(turn_at)) = (signals.indicator_at, signals.turn_at) else {
        return None;
    };
    let indicator = rules.indicator_window;
    let turn = rules.turn_window;
    if indicator.contains_inclusive(indicator_at) && turn.contains_inclusive(turn_at) {
        latch.latch(Outcome::Success);
        tracing::debug!(indicator_at, turn_at, "turn signalled and taken in time");
        None
    } else if indicator.is_before(indicator_at) || turn.is_before(turn_at) {
        Some(Outcome::Early)
    } else {
        Some(Outcome::Late)
    }
}
