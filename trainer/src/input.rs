//! Canonical control events from the two input surfaces: discrete UI actions and a
//! polled controller.
//!
//! The normalizer only debounces. Whether an action was correct is decided later by the
//! rule engine, which never sees raw device state.

use serde::{Deserialize, Serialize};

use crate::level::Side;
use crate::rate::ControlDirection;
use crate::settings::ControlSettings;

/// Discrete actions from on-screen buttons (or the HTTP surface).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlAction {
    Accelerate,
    Brake,
    HoldStart { direction: ControlDirection },
    HoldEnd,
    ToggleIndicator { side: Side },
    Turn { side: Side },
    Retry,
    ContinueAfterWarning,
    Teardown,
}

/// One poll of an external controller. Missing fields read as released / centred.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSample {
    /// -1 (full left) ..= 1 (full right).
    pub steer: f64,
    pub accelerator: f64,
    pub brake: f64,
    pub left_indicator: bool,
    pub right_indicator: bool,
    pub left_turn: bool,
    pub right_turn: bool,
}

impl DeviceSample {
    pub fn sanitized(mut self) -> Self {
        self.steer = finite(self.steer).clamp(-1.0, 1.0);
        self.accelerator = finite(self.accelerator).clamp(0.0, 1.0);
        self.brake = finite(self.brake).clamp(0.0, 1.0);
        self
    }

    fn indicator(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left_indicator,
            Side::Right => self.right_indicator,
        }
    }

    fn turn_button(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left_turn,
            Side::Right => self.right_turn,
        }
    }

    fn steer_side(&self, threshold: f64) -> Option<Side> {
        if self.steer < -threshold {
            Some(Side::Left)
        } else if self.steer > threshold {
            Some(Side::Right)
        } else {
            None
        }
    }
}

fn finite(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnSource {
    Button,
    Steering,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ControlEvent {
    /// Pedal held past the dead-zone during this poll.
    Pedal {
        direction: ControlDirection,
        magnitude: f64,
    },
    ToggleIndicator(Side),
    Turn { side: Side, source: TurnSource },
}

/// Edge detector over consecutive device samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputNormalizer {
    previous: Option<DeviceSample>,
}

impl InputNormalizer {
    pub fn clear(&mut self) {
        self.previous = None;
    }

    /// `None` means no controller is connected: no events, latch cleared.
    pub fn poll(
        &mut self,
        sample: Option<DeviceSample>,
        controls: &ControlSettings,
    ) -> Vec<ControlEvent> {
        let Some(sample) = sample.map(DeviceSample::sanitized) else {
            self.clear();
            return Vec::new();
        };
        let previous = self.previous.replace(sample).unwrap_or_default();

        let mut events = Vec::new();
        if sample.accelerator > controls.pedal_deadzone {
            events.push(ControlEvent::Pedal {
                direction: ControlDirection::Accelerate,
                magnitude: sample.accelerator,
            });
        }
        if sample.brake > controls.pedal_deadzone {
            events.push(ControlEvent::Pedal {
                direction: ControlDirection::Brake,
                magnitude: sample.brake,
            });
        }

        for side in [Side::Left, Side::Right] {
            if sample.indicator(side) && !previous.indicator(side) {
                events.push(ControlEvent::ToggleIndicator(side));
            }
        }
        for side in [Side::Left, Side::Right] {
            if sample.turn_button(side) && !previous.turn_button(side) {
                events.push(ControlEvent::Turn {
                    side,
                    source: TurnSource::Button,
                });
            }
        }

        let threshold = controls.steer_threshold;
        if let Some(side) = sample.steer_side(threshold) {
            if previous.steer_side(threshold) != Some(side) {
                events.push(ControlEvent::Turn {
                    side,
                    source: TurnSource::Steering,
                });
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> ControlSettings {
        ControlSettings::default()
    }

    #[test]
    fn indicator_fires_once_per_press() {
        let mut n = InputNormalizer::default();
        let pressed = DeviceSample {
            left_indicator: true,
            ..DeviceSample::default()
        };

        assert_eq!(
            n.poll(Some(pressed), &controls()),
            vec![ControlEvent::ToggleIndicator(Side::Left)]
        );
        assert!(n.poll(Some(pressed), &controls()).is_empty(), "held button must not re-fire");
        assert!(n.poll(Some(DeviceSample::default()), &controls()).is_empty());
        assert_eq!(n.poll(Some(pressed), &controls()).len(), 1);
    }

    #[test]
    fn steering_crossing_threshold_is_a_turn() {
        let mut n = InputNormalizer::default();
        let mut sample = DeviceSample {
            steer: 0.2,
            ..DeviceSample::default()
        };
        assert!(n.poll(Some(sample), &controls()).is_empty());

        sample.steer = 0.5;
        assert_eq!(
            n.poll(Some(sample), &controls()),
            vec![ControlEvent::Turn {
                side: Side::Right,
                source: TurnSource::Steering
            }]
        );
        sample.steer = 0.9;
        assert!(n.poll(Some(sample), &controls()).is_empty());

        sample.steer = -0.4;
        assert_eq!(
            n.poll(Some(sample), &controls()),
            vec![ControlEvent::Turn {
                side: Side::Left,
                source: TurnSource::Steering
            }]
        );
    }

    #[test]
    fn pedals_respect_deadzone_and_repeat_per_poll() {
        let mut n = InputNormalizer::default();
        let idle = DeviceSample {
            accelerator: 0.05,
            ..DeviceSample::default()
        };
        assert!(n.poll(Some(idle), &controls()).is_empty());

        let pressed = DeviceSample {
            brake: 0.8,
            ..DeviceSample::default()
        };
        for _ in 0..2 {
            assert_eq!(
                n.poll(Some(pressed), &controls()),
                vec![ControlEvent::Pedal {
                    direction: ControlDirection::Brake,
                    magnitude: 0.8
                }]
            );
        }
    }

    #[test]
    fn disconnect_clears_latch_and_nan_is_zero() {
        let mut n = InputNormalizer::default();
        let pressed = DeviceSample {
            right_turn: true,
            accelerator: f64::NAN,
            ..DeviceSample::default()
        };
        assert_eq!(n.poll(Some(pressed), &controls()).len(), 1);
        assert!(n.poll(None, &controls()).is_empty());
        // Latch was cleared, so the still-held button counts as a new press.
        assert_eq!(n.poll(Some(pressed), &controls()).len(), 1);
    }

    #[test]
    fn control_action_json_shape() {
        let action: ControlAction =
            serde_json::from_str(r#"{"action":"toggle_indicator","side":"right"}"#)
                .expect("action JSON should parse");
        assert_eq!(action, ControlAction::ToggleIndicator { side: Side::Right });

        let hold: ControlAction =
            serde_json::from_str(r#"{"action":"hold_start","direction":"brake"}"#)
                .expect("hold JSON should parse");
        assert_eq!(
            hold,
            ControlAction::HoldStart {
                direction: ControlDirection::Brake
            }
        );
    }
}
