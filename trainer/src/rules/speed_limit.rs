use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Outcome, RuleDecision, RuleEvent, RuleInput};
use crate::level::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpeedLimitProgress {
    /// Sticky: once over the limit inside the window, the attempt is an overspeed.
    pub crossed: bool,
    #[serde(with = "crate::serde_duration::option", default)]
    pub last_alert: Option<Duration>,
}

pub fn evaluate(
    window: &TimeWindow,
    speed_limit: f64,
    progress: &mut SpeedLimitProgress,
    input: &RuleInput<'_>,
    event: RuleEvent,
) -> Vec<RuleDecision> {
    if event == RuleEvent::MediaEnded {
        let outcome = if progress.crossed {
            Outcome::Overspeed
        } else {
            Outcome::Success
        };
        return vec![RuleDecision::Publish(outcome)];
    }

    let kmh = input.level.speed_kmh(input.rate);
    let over = window.contains_inclusive(input.position) && kmh > speed_limit;
    if !over {
        return Vec::new();
    }

    if !progress.crossed {
        tracing::debug!(position = input.position, kmh, speed_limit, "speed limit crossed");
    }
    progress.crossed = true;

    let due = match progress.last_alert {
        None => true,
        Some(last) => input.now.saturating_sub(last) >= input.timing.overspeed_alert_interval,
    };
    if due {
        progress.last_alert = Some(input.now);
        vec![RuleDecision::OverspeedAlert]
    } else {
        Vec::new()
    }
}
