//! Headless host: owns the engine runner, a simulated media element and the output sinks,
//! and applies every effect the engine produces.

use std::time::Duration;

use engine::HeadlessRunner;
use serde::{Deserialize, Serialize};

use crate::catalog::LevelCatalog;
use crate::error::Result;
use crate::feedback::{FeedbackSink, dispatch};
use crate::input::{ControlAction, DeviceSample};
use crate::media::{MediaEvent, SimulatedMedia};
use crate::recorder::CompletionSink;
use crate::session::{LevelLogic, SessionContext, SessionEffect, SessionInput};
use crate::settings::TrainerConfig;
use crate::state::AttemptState;
use crate::view::LevelView;

/// One line of a scripted play-through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    Control {
        #[serde(flatten)]
        action: ControlAction,
    },
    Device {
        #[serde(default)]
        sample: Option<DeviceSample>,
    },
    /// Let wall-clock time pass, with media ticking at the configured poll interval.
    Advance { ms: u64 },
}

pub struct Driver<F, C> {
    runner: HeadlessRunner<LevelLogic>,
    media: SimulatedMedia,
    clock: Duration,
    frame: Duration,
    feedback: F,
    completions: C,
}

impl<F: FeedbackSink, C: CompletionSink> Driver<F, C> {
    pub fn new(logic: LevelLogic, feedback: F, completions: C) -> Self {
        let level = logic.level();
        let media = SimulatedMedia::new(level.clip.clone(), level.video_end);
        let frame = logic.config().server.poll_interval;
        Self {
            runner: HeadlessRunner::new(logic),
            media,
            clock: Duration::ZERO,
            frame,
            feedback,
            completions,
        }
    }

    /// Looks up the level and checks the user before anything runs.
    pub fn start(
        catalog: &LevelCatalog,
        level_id: &str,
        user: Option<&str>,
        config: TrainerConfig,
        feedback: F,
        completions: C,
    ) -> Result<Self> {
        let context = SessionContext::new(user)?;
        let level = catalog.get(level_id)?.clone();
        tracing::info!(level = %level.id, user = %context.user(), "level started");
        Ok(Self::new(
            LevelLogic::new(level, context, config),
            feedback,
            completions,
        ))
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn runner(&self) -> &HeadlessRunner<LevelLogic> {
        &self.runner
    }

    pub fn state(&self) -> &AttemptState {
        self.runner.state()
    }

    pub fn media(&self) -> &SimulatedMedia {
        &self.media
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    pub fn completions(&self) -> &C {
        &self.completions
    }

    pub fn view(&self) -> LevelView {
        LevelView::from_state(self.runner.logic().level(), self.runner.state())
    }

    pub fn control(&mut self, action: ControlAction) {
        self.send(SessionInput::Control {
            at: self.clock,
            action,
        });
    }

    pub fn poll_device(&mut self, sample: Option<DeviceSample>) {
        self.send(SessionInput::DevicePoll {
            at: self.clock,
            sample,
        });
    }

    /// Moves wall-clock time forward by `dt`, then lets the media element play for it.
    pub fn advance(&mut self, dt: Duration) {
        self.clock = self.clock.saturating_add(dt);
        self.send(SessionInput::Clock { at: self.clock });
        for event in self.media.advance(dt.as_secs_f64()) {
            let input = match event {
                MediaEvent::TimeUpdate(position) => SessionInput::MediaTime {
                    at: self.clock,
                    position,
                },
                MediaEvent::Ended => SessionInput::MediaEnded { at: self.clock },
            };
            self.send(input);
        }
    }

    /// `advance` in frame-sized slices.
    pub fn run_for(&mut self, total: Duration) {
        let mut left = total;
        while !left.is_zero() {
            let dt = left.min(self.frame);
            self.advance(dt);
            left -= dt;
        }
    }

    pub fn run_script(&mut self, steps: &[ScriptStep]) {
        for step in steps {
            match step {
                ScriptStep::Control { action } => self.control(*action),
                ScriptStep::Device { sample } => self.poll_device(*sample),
                ScriptStep::Advance { ms } => self.run_for(Duration::from_millis(*ms)),
            }
        }
    }

    fn send(&mut self, input: SessionInput) {
        self.runner.step(input);
        self.flush();
    }

    /// Applies pending effects in the order they were produced.
    pub fn flush(&mut self) {
        for effect in self.runner.drain_effects() {
            match effect {
                SessionEffect::Media { command } => self.media.apply(&command),
                SessionEffect::Feedback { request } => {
                    dispatch(&mut self.feedback, std::iter::once(&request))
                }
                SessionEffect::Completed { record } => {
                    if let Err(err) = self.completions.upsert(&record) {
                        tracing::warn!(%err, level = %record.level_id, "could not record completion");
                    }
                }
            }
        }
    }
}
