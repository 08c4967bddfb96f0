//! Brake and stop-for-signal levels: come to rest inside the window.

use serde::{Deserialize, Serialize};

use super::{Outcome, OutcomeLatch, RuleDecision, RuleEvent, RuleInput};
use crate::level::TimeWindow;

fn classify_stop(window: &TimeWindow, position: f64) -> Outcome {
    if window.is_before(position) {
        Outcome::Early
    } else if window.is_after(position) {
        Outcome::Late
    } else {
        Outcome::Success
    }
}

pub fn evaluate_brake(
    window: &TimeWindow,
    latch: &OutcomeLatch,
    input: &RuleInput<'_>,
    event: RuleEvent,
) -> Vec<RuleDecision> {
    match event {
        RuleEvent::RateChanged(change) if change.braked_to_rest() => {
            vec![RuleDecision::Publish(classify_stop(window, input.position))]
        }
        RuleEvent::MediaEnded => {
            vec![RuleDecision::Publish(latch.latched().unwrap_or(Outcome::Late))]
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StopProgress {
    /// Position of the in-window stop, once captured.
    pub stopped_at: Option<f64>,
    pub wait_active: bool,
    pub wait_done: bool,
    /// Moved inside the window before any stop was captured.
    pub moved_through: bool,
}

impl StopProgress {
    /// The wait ran to completion; returns the captured stop position.
    pub fn finish_wait(&mut self) -> Option<f64> {
        if !self.wait_active {
            return None;
        }
        self.wait_active = false;
        self.wait_done = true;
        self.stopped_at
    }
}

pub fn evaluate_stop(
    window: &TimeWindow,
    stop: &mut StopProgress,
    latch: &mut OutcomeLatch,
    input: &RuleInput<'_>,
    event: RuleEvent,
) -> Vec<RuleDecision> {
    let position = input.position;
    let mut decisions = Vec::new();

    match event {
        RuleEvent::MediaEnded => {
            let outcome = match latch.latched() {
                Some(latched) => latched,
                None if stop.moved_through => Outcome::JumpedSignal,
                None => Outcome::Late,
            };
            decisions.push(RuleDecision::Publish(outcome));
            return decisions;
        }
        RuleEvent::RateChanged(change) if change.braked_to_rest() && stop.stopped_at.is_none() => {
            match classify_stop(window, position) {
                Outcome::Success => {
                    stop.stopped_at = Some(position);
                    stop.wait_active = true;
                    latch.latch(Outcome::Success);
                    tracing::debug!(position, "stop captured inside signal window");
                    decisions.push(RuleDecision::BeginStopWait {
                        stopped_at: position,
                    });
                }
                early_or_late => decisions.push(RuleDecision::Publish(early_or_late)),
            }
            return decisions;
        }
        RuleEvent::RateChanged(change) if change.after > 0.0 && stop.wait_active => {
            stop.wait_active = false;
            latch.latch(Outcome::JumpedSignal);
            tracing::debug!(position, "moved off before the signal changed");
            decisions.push(RuleDecision::AbortStopWait);
            return decisions;
        }
        _ => {}
    }

    if stop.stopped_at.is_none() && input.rate > 0.0 && window.contains_inclusive(position) {
        stop.moved_through = true;
    }
    decisions
}
