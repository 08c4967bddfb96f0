//! The per-level evaluation engine as a deterministic [`TickLogic`].
//!
//! Every input carries the wall-clock time it happened at. Before an input is handled,
//! every timer due at or before that time fires, earliest first, one at a time. Side
//! effects (media commands, feedback, the completion fact) are pushed to the effect
//! outbox; the host decides how to apply them.

use std::time::Duration;

use engine::TickLogic;
use engine::timers::Expired;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainerError};
use crate::feedback::{Cue, FeedbackRequest, requests_for};
use crate::input::{ControlAction, ControlEvent, DeviceSample, TurnSource};
use crate::level::{LevelDefinition, LevelRules, Side, StopResume};
use crate::media::MediaCommand;
use crate::rate::{ControlDirection, RateChange};
use crate::recorder::CompletionRecord;
use crate::rules::{self, Outcome, RuleDecision, RuleEvent, RuleInput, RuleProgress};
use crate::sequence::{SequenceKind, WarningReason};
use crate::settings::TrainerConfig;
use crate::state::{Alerts, AttemptState, TimerKind};
use crate::timeline::TimelineEvent;

/// Who is playing. Required before any level starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    user: String,
}

impl SessionContext {
    pub fn new(user: Option<&str>) -> Result<Self> {
        match user.map(str::trim) {
            Some(name) if !name.is_empty() => Ok(Self {
                user: name.to_string(),
            }),
            _ => Err(TrainerError::MissingUser),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum SessionInput {
    Control {
        #[serde(with = "crate::serde_duration")]
        at: Duration,
        action: ControlAction,
    },
    DevicePoll {
        #[serde(with = "crate::serde_duration")]
        at: Duration,
        #[serde(default)]
        sample: Option<DeviceSample>,
    },
    MediaTime {
        #[serde(with = "crate::serde_duration")]
        at: Duration,
        position: f64,
    },
    MediaEnded {
        #[serde(with = "crate::serde_duration")]
        at: Duration,
    },
    /// Nothing happened except time passing; lets due timers fire.
    Clock {
        #[serde(with = "crate::serde_duration")]
        at: Duration,
    },
}

impl SessionInput {
    pub fn at(&self) -> Duration {
        match self {
            Self::Control { at, .. }
            | Self::DevicePoll { at, .. }
            | Self::MediaTime { at, .. }
            | Self::MediaEnded { at }
            | Self::Clock { at } => *at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SessionEffect {
    Media { command: MediaCommand },
    Feedback { request: FeedbackRequest },
    Completed { record: CompletionRecord },
}

#[derive(Debug, Clone)]
pub struct LevelLogic {
    level: LevelDefinition,
    context: SessionContext,
    config: TrainerConfig,
}

impl LevelLogic {
    pub fn new(level: LevelDefinition, context: SessionContext, config: TrainerConfig) -> Self {
        Self {
            level,
            context,
            config: config.sanitized(),
        }
    }

    pub fn level(&self) -> &LevelDefinition {
        &self.level
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// The state a retry produces for the given attempt number.
    pub fn fresh_state(&self, attempt: u32) -> AttemptState {
        AttemptState::new(&self.level, attempt)
    }
}

impl TickLogic for LevelLogic {
    type State = AttemptState;
    type Input = SessionInput;
    type Effect = SessionEffect;

    fn initial_state(&self) -> Self::State {
        self.fresh_state(0)
    }

    fn step(&self, state: &mut Self::State, input: Self::Input, effects: &mut Vec<Self::Effect>) {
        if state.torn_down {
            return;
        }
        let mut tick = Tick {
            logic: self,
            state,
            effects,
        };
        tick.fire_due_timers(input.at());
        tick.handle(input);
    }
}

/// One `step` call: the logic, the state it mutates and the effect outbox.
struct Tick<'a> {
    logic: &'a LevelLogic,
    state: &'a mut AttemptState,
    effects: &'a mut Vec<SessionEffect>,
}

impl Tick<'_> {
    fn level(&self) -> &LevelDefinition {
        &self.logic.level
    }

    fn media(&mut self, command: MediaCommand) {
        self.effects.push(SessionEffect::Media { command });
    }

    fn cue(&mut self, cue: Cue) {
        self.effects.extend(
            requests_for(cue)
                .into_iter()
                .map(|request| SessionEffect::Feedback { request }),
        );
    }

    fn is_terminal(&self) -> bool {
        self.state.verdict.is_terminal()
    }

    fn fire_due_timers(&mut self, at: Duration) {
        while let Some(expired) = self.state.timers.pop_due(at) {
            self.state.clock = self.state.clock.max(expired.due);
            self.on_timer(expired);
        }
        self.state.clock = self.state.clock.max(at);
    }

    fn on_timer(&mut self, expired: Expired<TimerKind>) {
        match expired.kind {
            TimerKind::HoldRepeat => match self.state.drive.hold() {
                Some(hold) if hold.timer == expired.id => {
                    let step = self.logic.config.controls.hold_step;
                    let change = self.state.drive.push(hold.direction, step);
                    self.after_rate_change(change);
                }
                _ => {
                    self.state.timers.cancel(expired.id);
                }
            },
            TimerKind::SequenceDeadline => {
                if self.state.sequence.deadline() == Some(expired.id) {
                    self.on_sequence_deadline();
                }
            }
            TimerKind::ResumeAlertEnd => {
                if self.state.alerts.resume_alert == Some(expired.id) {
                    self.state.alerts.resume_alert = None;
                }
            }
            TimerKind::OverspeedFlashEnd => {
                if self.state.alerts.overspeed_flash == Some(expired.id) {
                    self.state.alerts.overspeed_flash = None;
                }
            }
        }
    }

    fn on_sequence_deadline(&mut self) {
        if let Some(rate) = self.state.sequence.finish_countdown() {
            tracing::info!(rate, "warning countdown finished, resuming");
            let change = self.state.drive.force(rate);
            let delay = self.logic.config.timing.resume_alert;
            let id = self
                .state
                .timers
                .schedule(self.state.clock, delay, TimerKind::ResumeAlertEnd);
            self.state.alerts.resume_alert = Some(id);
            self.cue(Cue::ResumeAlert);
            let command = self.state.drive.playback();
            self.media(command);
            self.evaluate(RuleEvent::RateChanged(change));
            if std::mem::take(&mut self.state.media_end_deferred) {
                self.on_media_ended();
            }
            return;
        }

        let Some(done) = self.state.sequence.finish_stop_wait() else {
            return;
        };
        if let RuleProgress::Stop(stop) = &mut self.state.rules {
            stop.finish_wait();
        }
        tracing::info!(stopped_at = done.stopped_at, "signal wait finished");
        match done.resume {
            StopResume::SwapClip { clip } => {
                self.state.timeline.relocate(Some(&clip), done.stopped_at);
                self.media(MediaCommand::Load {
                    clip,
                    position: done.stopped_at,
                });
            }
            StopResume::SkipTo { position } => {
                self.state.timeline.relocate(None, position);
                self.media(MediaCommand::Seek { position });
            }
        }
        // Paused until the learner accelerates.
        if self.state.drive.rate() == 0.0 {
            self.media(MediaCommand::Pause);
        }
    }

    fn handle(&mut self, input: SessionInput) {
        match input {
            SessionInput::Control { action, .. } => self.on_control(action),
            SessionInput::DevicePoll { sample, .. } => self.on_device(sample),
            SessionInput::MediaTime { position, .. } => self.on_media_time(position),
            SessionInput::MediaEnded { .. } => self.on_media_ended(),
            SessionInput::Clock { .. } => {}
        }
    }

    fn on_control(&mut self, action: ControlAction) {
        match action {
            ControlAction::Retry => return self.retry(),
            ControlAction::Teardown => return self.teardown(),
            _ => {}
        }
        if self.is_terminal() {
            return;
        }
        if action == ControlAction::ContinueAfterWarning {
            return self.continue_after_warning();
        }
        if self.state.sequence.suspends_evaluation() {
            tracing::debug!(?action, "control ignored while a warning is showing");
            return;
        }

        let controls = self.logic.config.controls;
        match action {
            ControlAction::Accelerate => self.nudge(ControlDirection::Accelerate, controls.tap_step),
            ControlAction::Brake => self.nudge(ControlDirection::Brake, controls.tap_step),
            ControlAction::HoldStart { direction } => {
                let id = self.state.timers.schedule_repeating(
                    self.state.clock,
                    controls.hold_interval,
                    TimerKind::HoldRepeat,
                );
                if let Some(previous) = self.state.drive.begin_hold(direction, id) {
                    self.state.timers.cancel(previous);
                }
            }
            ControlAction::HoldEnd => self.end_hold(),
            ControlAction::ToggleIndicator { side } => self.toggle_indicator(side),
            ControlAction::Turn { side } => self.turn(side, TurnSource::Button),
            ControlAction::Retry | ControlAction::Teardown | ControlAction::ContinueAfterWarning => {}
        }
    }

    fn on_device(&mut self, sample: Option<DeviceSample>) {
        let controls = self.logic.config.controls;
        let events = self.state.input.poll(sample, &controls);
        if self.is_terminal() || self.state.sequence.suspends_evaluation() {
            return;
        }
        for event in events {
            if self.is_terminal() || self.state.sequence.suspends_evaluation() {
                break;
            }
            match event {
                ControlEvent::Pedal {
                    direction,
                    magnitude,
                } => self.nudge(direction, controls.pedal_gain * magnitude),
                ControlEvent::ToggleIndicator(side) => self.toggle_indicator(side),
                ControlEvent::Turn { side, source } => self.turn(side, source),
            }
        }
    }

    fn on_media_time(&mut self, position: f64) {
        if self.is_terminal() {
            return;
        }
        let events = self.state.timeline.sample(&self.logic.level, position);
        for event in events {
            match event {
                TimelineEvent::StampReached { .. } => self.cue(Cue::StampReached),
                TimelineEvent::Announce(category) => {
                    let phrase = self.level().announcement(category);
                    self.cue(Cue::Announce(phrase));
                }
                TimelineEvent::WindowChanged { .. } => {}
            }
        }
        if !self.state.sequence.suspends_evaluation() {
            self.evaluate(RuleEvent::Tick);
        }
    }

    fn on_media_ended(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state.timeline.end();
        if self.state.sequence.suspends_evaluation() {
            tracing::debug!("media ended during a warning, judging after the countdown");
            self.state.media_end_deferred = true;
            return;
        }
        self.evaluate(RuleEvent::MediaEnded);
    }

    fn nudge(&mut self, direction: ControlDirection, amount: f64) {
        let change = self.state.drive.push(direction, amount);
        self.after_rate_change(change);
    }

    /// Rules see the change first; media follows unless a sequence holds it.
    fn after_rate_change(&mut self, change: RateChange) {
        self.evaluate(RuleEvent::RateChanged(change));
        if self.is_terminal() || self.state.sequence.is_active() || !change.changed() {
            return;
        }
        let command = self.state.drive.playback();
        self.media(command);
    }

    fn end_hold(&mut self) {
        if let Some(timer) = self.state.drive.end_hold() {
            self.state.timers.cancel(timer);
        }
    }

    fn toggle_indicator(&mut self, side: Side) {
        let position = self.state.timeline.position();
        self.state.signals.toggle_indicator(side, position);
        self.cue(Cue::IndicatorToggled);
        self.evaluate(RuleEvent::SignalsChanged);
    }

    fn turn(&mut self, side: Side, source: TurnSource) {
        if !self.level().allows_turning() {
            return self.warn(WarningReason::SteeringNotAllowed);
        }
        let LevelRules::Turn { side: required, .. } = self.level().rules else {
            return;
        };
        if side != required && source == TurnSource::Button {
            return self.warn(WarningReason::TurnNotAllowed { attempted: side });
        }
        let position = self.state.timeline.position();
        if self.state.signals.record_turn(side, position) {
            tracing::debug!(?side, ?source, position, "turn taken");
            self.evaluate(RuleEvent::SignalsChanged);
        }
    }

    fn warn(&mut self, reason: WarningReason) {
        let rate = self.state.drive.rate();
        if !self.state.sequence.enter_warning(reason, rate) {
            return;
        }
        tracing::info!(?reason, rate, "rule-violation warning");
        self.end_hold();
        self.state.drive.force(0.0);
        self.media(MediaCommand::Pause);
        self.cue(Cue::SequenceEntered(SequenceKind::Warning));
    }

    fn continue_after_warning(&mut self) {
        if self.state.sequence.kind() != Some(SequenceKind::Warning) {
            return;
        }
        let delay = self.logic.config.timing.warning_countdown;
        let ends_at = self.state.clock.saturating_add(delay);
        let id = self
            .state
            .timers
            .schedule(self.state.clock, delay, TimerKind::SequenceDeadline);
        self.state.sequence.start_countdown(ends_at, id);
        self.cue(Cue::SequenceEntered(SequenceKind::Countdown));
    }

    fn evaluate(&mut self, event: RuleEvent) {
        if self.is_terminal() {
            return;
        }
        let logic = self.logic;
        let state = &mut *self.state;
        let input = RuleInput {
            level: &logic.level,
            timing: &logic.config.timing,
            now: state.clock,
            position: state.timeline.position(),
            rate: state.drive.rate(),
            signals: &state.signals,
        };
        let decisions = rules::evaluate(&mut state.rules, &mut state.verdict, &input, event);
        for decision in decisions {
            self.apply(decision);
        }
    }

    fn apply(&mut self, decision: RuleDecision) {
        match decision {
            RuleDecision::Publish(outcome) => self.finalize(outcome),
            RuleDecision::BeginStopWait { stopped_at } => self.begin_stop_wait(stopped_at),
            RuleDecision::AbortStopWait => {
                if let Some(timer) = self.state.sequence.abort() {
                    self.state.timers.cancel(timer);
                }
            }
            RuleDecision::OverspeedAlert => {
                self.cue(Cue::OverspeedAlert);
                if let Some(previous) = self.state.alerts.overspeed_flash.take() {
                    self.state.timers.cancel(previous);
                }
                let id = self.state.timers.schedule(
                    self.state.clock,
                    self.logic.config.timing.overspeed_flash,
                    TimerKind::OverspeedFlashEnd,
                );
                self.state.alerts.overspeed_flash = Some(id);
            }
        }
    }

    fn begin_stop_wait(&mut self, stopped_at: f64) {
        let logic = self.logic;
        let LevelRules::Stop { resume, .. } = &logic.level.rules else {
            return;
        };
        let delay = logic.config.timing.stop_wait;
        let ends_at = self.state.clock.saturating_add(delay);
        let id = self
            .state
            .timers
            .schedule(self.state.clock, delay, TimerKind::SequenceDeadline);
        if !self
            .state
            .sequence
            .begin_stop_wait(stopped_at, resume.clone(), ends_at, id)
        {
            self.state.timers.cancel(id);
            return;
        }
        tracing::info!(stopped_at, "stopped at the signal, waiting");
        self.media(MediaCommand::Pause);
        if let Some(kind) = self.state.sequence.kind() {
            self.cue(Cue::SequenceEntered(kind));
        }
    }

    fn finalize(&mut self, outcome: Outcome) {
        if !self.state.verdict.publish(outcome) {
            return;
        }
        tracing::info!(level = %self.level().id, ?outcome, attempt = self.state.attempt, "outcome published");

        self.state.drive.end_hold();
        self.state.drive.force(0.0);
        self.state.timers.clear();
        self.state.sequence.abort();
        self.state.alerts = Alerts::default();
        self.media(MediaCommand::Pause);
        self.cue(Cue::OutcomeReached(outcome));

        if outcome.is_success() && !self.state.recorded {
            self.state.recorded = true;
            let record = CompletionRecord {
                user: self.logic.context.user.clone(),
                level_id: self.level().id.clone(),
                completed: true,
            };
            self.effects.push(SessionEffect::Completed { record });
        }
    }

    fn retry(&mut self) {
        let attempt = self.state.attempt.saturating_add(1);
        tracing::info!(level = %self.level().id, attempt, "retry");
        *self.state = self.logic.fresh_state(attempt);
        let clip = self.level().clip.clone();
        self.media(MediaCommand::Load {
            clip,
            position: 0.0,
        });
    }

    fn teardown(&mut self) {
        self.state.timers.clear();
        self.state.drive.end_hold();
        self.state.sequence.abort();
        self.state.alerts = Alerts::default();
        self.state.torn_down = true;
        self.media(MediaCommand::Pause);
        tracing::debug!(level = %self.level().id, "session torn down");
    }
}
