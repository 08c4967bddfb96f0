mod common;

use common::{Harness, feedback, logic, media_commands};
use engine::regression::state_digest;
use trainer::feedback::{FeedbackRequest, HapticPattern};
use trainer::input::ControlAction;
use trainer::level::Side;
use trainer::media::MediaCommand;
use trainer::rate::ControlDirection;
use trainer::rules::Outcome;
use trainer::sequence::SequenceKind;

fn vibrations(effects: &[trainer::session::SessionEffect]) -> Vec<HapticPattern> {
    feedback(effects)
        .into_iter()
        .filter_map(|request| match request {
            FeedbackRequest::Vibrate { pattern } => Some(pattern),
            _ => None,
        })
        .collect()
}

fn phrases(effects: &[trainer::session::SessionEffect]) -> Vec<String> {
    feedback(effects)
        .into_iter()
        .filter_map(|request| match request {
            FeedbackRequest::Speak { phrase } => Some(phrase),
            _ => None,
        })
        .collect()
}

#[test]
fn warning_then_continue_restores_the_rate_after_the_countdown() {
    let mut h = Harness::new("lvl-1");
    h.tap(ControlAction::Accelerate, 2);
    let warned = h.control(ControlAction::Turn { side: Side::Left });
    assert_eq!(media_commands(&warned), vec![MediaCommand::Pause]);
    assert_eq!(vibrations(&warned), vec![HapticPattern::WARNING]);
    assert_eq!(h.rate(), 0.0);

    // Controls are ignored while the warning shows.
    assert!(h.control(ControlAction::Accelerate).is_empty());
    assert_eq!(h.rate(), 0.0);

    h.control(ControlAction::ContinueAfterWarning);
    let state = h.runner.state();
    assert_eq!(state.sequence.kind(), Some(SequenceKind::Countdown));
    assert_eq!(state.sequence.countdown_secs(h.now), Some(3));

    h.wait(2_999);
    assert_eq!(h.rate(), 0.0);
    assert_eq!(
        h.runner.state().sequence.kind(),
        Some(SequenceKind::Countdown)
    );

    let resumed = h.wait(1);
    assert_eq!(h.rate(), 0.5);
    assert!(!h.runner.state().sequence.is_active());
    assert_eq!(
        media_commands(&resumed),
        vec![MediaCommand::Play { rate: 0.5 }]
    );
    assert!(vibrations(&resumed).contains(&HapticPattern::RESUME_ALERT));
    assert!(h.runner.state().alerts.resume_alert.is_some());

    // The resume alert does not block driving.
    h.control(ControlAction::Accelerate);
    assert_eq!(h.rate(), 0.75);

    h.wait(2_000);
    assert!(h.runner.state().alerts.resume_alert.is_none());
    assert_eq!(h.outcome(), Outcome::Pending);
}

#[test]
fn media_end_during_a_warning_is_judged_after_the_countdown() {
    let mut h = Harness::new("lvl-1");
    h.control(ControlAction::Accelerate);
    h.media_time(5.0);
    h.control(ControlAction::Turn { side: Side::Left });

    h.media_ended();
    assert_eq!(h.outcome(), Outcome::Pending);
    assert!(h.runner.state().media_end_deferred);

    h.control(ControlAction::ContinueAfterWarning);
    h.wait(2_999);
    assert_eq!(h.outcome(), Outcome::Pending);

    h.wait(1);
    assert!(!h.runner.state().sequence.is_active());
    assert!(!h.runner.state().media_end_deferred);
    assert_eq!(h.outcome(), Outcome::Late);
}

#[test]
fn retry_drops_a_deferred_media_end() {
    let mut h = Harness::new("lvl-1");
    h.control(ControlAction::Turn { side: Side::Right });
    h.media_ended();
    assert!(h.runner.state().media_end_deferred);
    h.control(ControlAction::Retry);
    assert!(!h.runner.state().media_end_deferred);
    assert_eq!(h.outcome(), Outcome::Pending);
}

#[test]
fn continue_without_a_warning_does_nothing() {
    let mut h = Harness::new("lvl-1");
    assert!(h.control(ControlAction::ContinueAfterWarning).is_empty());
    assert!(!h.runner.state().sequence.is_active());
}

#[test]
fn holding_a_pedal_repeats_until_released() {
    let mut h = Harness::new("lvl-1");
    h.control(ControlAction::HoldStart {
        direction: ControlDirection::Accelerate,
    });
    assert_eq!(h.rate(), 0.0);

    h.wait(150);
    assert_eq!(h.rate(), 0.1);
    h.wait(300);
    assert_eq!(h.rate(), 0.3);

    h.control(ControlAction::HoldEnd);
    h.wait(1_000);
    assert_eq!(h.rate(), 0.3);
}

#[test]
fn a_new_hold_replaces_the_old_one() {
    let mut h = Harness::new("lvl-1");
    h.tap(ControlAction::Accelerate, 4);
    h.control(ControlAction::HoldStart {
        direction: ControlDirection::Accelerate,
    });
    h.wait(100);
    h.control(ControlAction::HoldStart {
        direction: ControlDirection::Brake,
    });
    h.wait(150);
    assert_eq!(h.rate(), 0.9);
    assert_eq!(h.runner.state().timers.len(), 1);
}

#[test]
fn retry_produces_a_fresh_attempt() {
    let mut h = Harness::new("lvl-1");
    h.stop_at(5.0);
    assert_eq!(h.outcome(), Outcome::Success);

    let effects = h.control(ControlAction::Retry);
    assert_eq!(
        media_commands(&effects),
        vec![MediaCommand::Load {
            clip: "level1".into(),
            position: 0.0
        }]
    );

    let fresh = logic("lvl-1").fresh_state(1);
    assert_eq!(h.runner.state(), &fresh);
    assert_eq!(
        state_digest(h.runner.state()).expect("digest"),
        state_digest(&fresh).expect("digest")
    );

    // The new attempt evaluates from scratch.
    h.stop_at(2.0);
    assert_eq!(h.outcome(), Outcome::Early);
}

#[test]
fn no_timer_outlives_a_retry() {
    let mut h = Harness::new("lvl-4");
    h.control(ControlAction::HoldStart {
        direction: ControlDirection::Accelerate,
    });
    h.wait(150);
    h.media_time(2.0);
    h.control(ControlAction::HoldEnd);
    h.tap(ControlAction::Brake, 1);
    assert_eq!(
        h.runner.state().sequence.kind(),
        Some(SequenceKind::TrafficWait)
    );

    h.control(ControlAction::Retry);
    assert!(h.runner.state().timers.is_empty());
    let later = h.wait(10_000);
    assert!(later.is_empty());
    assert_eq!(h.runner.state().timeline.clip(), "level4red");
}

#[test]
fn teardown_silences_everything() {
    let mut h = Harness::new("lvl-1");
    h.control(ControlAction::HoldStart {
        direction: ControlDirection::Accelerate,
    });
    h.wait(150);
    let effects = h.control(ControlAction::Teardown);
    assert_eq!(media_commands(&effects), vec![MediaCommand::Pause]);
    assert!(h.runner.state().torn_down);

    assert!(h.wait(5_000).is_empty());
    assert!(h.control(ControlAction::Accelerate).is_empty());
    assert!(h.control(ControlAction::Retry).is_empty());
    assert!(h.media_ended().is_empty());
    assert_eq!(h.outcome(), Outcome::Pending);
}

#[test]
fn stamps_and_announcements_fire_once() {
    let mut h = Harness::new("lvl-2");
    h.control(ControlAction::Accelerate);

    let first = h.media_time(3.0);
    assert_eq!(vibrations(&first), vec![HapticPattern::STAMP]);
    assert_eq!(phrases(&first), vec!["Turn on right indicator now".to_string()]);

    // Duplicate and stale ticks are ignored.
    assert!(vibrations(&h.media_time(3.0)).is_empty());
    assert!(feedback(&h.media_time(2.0)).is_empty());
    assert_eq!(h.runner.state().position(), 3.0);

    let second = h.media_time(5.6);
    assert_eq!(vibrations(&second), vec![HapticPattern::STAMP]);
    assert_eq!(phrases(&second), vec!["Take right turn now".to_string()]);
    assert!(feedback(&h.media_time(5.7)).is_empty());
}

#[test]
fn stamps_jumped_over_all_fire() {
    let mut h = Harness::new("lvl-2");
    let effects = h.media_time(6.0);
    assert_eq!(
        vibrations(&effects),
        vec![HapticPattern::STAMP, HapticPattern::STAMP]
    );
}

#[test]
fn media_end_hides_hints() {
    let mut h = Harness::new("lvl-1");
    h.media_time(5.0);
    assert!(h.runner.state().timeline.is_visible(trainer::level::HintCategory::Brake));
    h.media_ended();
    assert_eq!(h.runner.state().timeline.visible().count(), 0);
    assert_eq!(h.outcome(), Outcome::Late);
}

#[test]
fn retry_after_any_failure_can_still_succeed() {
    let cases: [(&str, fn(&mut Harness)); 3] = [
        ("lvl-1", |h: &mut Harness| {
            h.stop_at(2.0);
        }),
        ("lvl-2", |h: &mut Harness| {
            h.media_time(4.0);
            h.control(ControlAction::ToggleIndicator { side: Side::Left });
        }),
        ("lvl-5", |h: &mut Harness| {
            h.tap(ControlAction::Accelerate, 8);
            h.media_time(9.0);
            h.media_ended();
        }),
    ];
    for (level, fail) in cases {
        let mut h = Harness::new(level);
        fail(&mut h);
        assert!(h.outcome().is_terminal(), "{level} should have failed");
        assert!(!h.outcome().is_success());

        h.wait(1_000);
        h.control(ControlAction::Retry);
        assert_eq!(h.outcome(), Outcome::Pending);
        assert_eq!(h.runner.state().attempt, 1);

        match level {
            "lvl-1" => {
                h.stop_at(6.0);
            }
            "lvl-2" => {
                h.media_time(4.0);
                h.control(ControlAction::ToggleIndicator { side: Side::Right });
                h.media_time(7.0);
                h.control(ControlAction::Turn { side: Side::Right });
                h.media_ended();
            }
            _ => {
                h.tap(ControlAction::Accelerate, 4);
                h.media_time(9.0);
                h.media_ended();
            }
        }
        assert_eq!(h.outcome(), Outcome::Success, "{level} after retry");
    }
}
