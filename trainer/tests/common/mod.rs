#![allow(dead_code)]

use std::time::Duration;

use engine::HeadlessRunner;
use trainer::catalog::LevelCatalog;
use trainer::feedback::FeedbackRequest;
use trainer::input::{ControlAction, DeviceSample};
use trainer::media::MediaCommand;
use trainer::rules::Outcome;
use trainer::session::{LevelLogic, SessionContext, SessionEffect, SessionInput};
use trainer::settings::TrainerConfig;

pub fn logic(level_id: &str) -> LevelLogic {
    let level = LevelCatalog::builtin()
        .get(level_id)
        .expect("builtin level")
        .clone();
    let context = SessionContext::new(Some("ana")).expect("user");
    LevelLogic::new(level, context, TrainerConfig::default())
}

/// Drives a level directly through the engine with hand-picked media positions.
pub struct Harness {
    pub runner: HeadlessRunner<LevelLogic>,
    pub now: Duration,
}

impl Harness {
    pub fn new(level_id: &str) -> Self {
        Self {
            runner: HeadlessRunner::new(logic(level_id)),
            now: Duration::ZERO,
        }
    }

    pub fn send(&mut self, input: SessionInput) -> Vec<SessionEffect> {
        self.runner.step(input);
        self.runner.drain_effects()
    }

    /// Lets `ms` of wall-clock time pass.
    pub fn wait(&mut self, ms: u64) -> Vec<SessionEffect> {
        self.now += Duration::from_millis(ms);
        self.send(SessionInput::Clock { at: self.now })
    }

    pub fn control(&mut self, action: ControlAction) -> Vec<SessionEffect> {
        self.send(SessionInput::Control {
            at: self.now,
            action,
        })
    }

    pub fn tap(&mut self, action: ControlAction, times: usize) {
        for _ in 0..times {
            self.control(action);
        }
    }

    pub fn device(&mut self, sample: Option<DeviceSample>) -> Vec<SessionEffect> {
        self.send(SessionInput::DevicePoll {
            at: self.now,
            sample,
        })
    }

    pub fn media_time(&mut self, position: f64) -> Vec<SessionEffect> {
        self.send(SessionInput::MediaTime {
            at: self.now,
            position,
        })
    }

    pub fn media_ended(&mut self) -> Vec<SessionEffect> {
        self.send(SessionInput::MediaEnded { at: self.now })
    }

    pub fn outcome(&self) -> Outcome {
        self.runner.state().outcome()
    }

    pub fn rate(&self) -> f64 {
        self.runner.state().rate()
    }

    /// Accelerate once, move the media to `position`, then brake to a standstill there.
    pub fn stop_at(&mut self, position: f64) -> Vec<SessionEffect> {
        self.control(ControlAction::Accelerate);
        self.media_time(position);
        self.control(ControlAction::Brake)
    }
}

pub fn media_commands(effects: &[SessionEffect]) -> Vec<MediaCommand> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            SessionEffect::Media { command } => Some(command.clone()),
            _ => None,
        })
        .collect()
}

pub fn feedback(effects: &[SessionEffect]) -> Vec<FeedbackRequest> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            SessionEffect::Feedback { request } => Some(request.clone()),
            _ => None,
        })
        .collect()
}

pub fn completions(effects: &[SessionEffect]) -> usize {
    effects
        .iter()
        .filter(|effect| matches!(effect, SessionEffect::Completed { .. }))
        .count()
}
