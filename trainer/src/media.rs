//! Playback commands the engine issues, and a simulated media element that obeys them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MediaCommand {
    Play { rate: f64 },
    Pause,
    /// Switch source, seeked to `position` and left paused.
    Load { clip: String, position: f64 },
    Seek { position: f64 },
}

/// Media element notifications.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    TimeUpdate(f64),
    Ended,
}

/// Stand-in for a video element: position advances by `rate * dt` while playing and
/// stops at `duration`, where `Ended` is reported once per source.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedMedia {
    clip: String,
    position: f64,
    rate: f64,
    playing: bool,
    duration: f64,
    ended: bool,
}

impl SimulatedMedia {
    pub fn new(clip: impl Into<String>, duration: f64) -> Self {
        Self {
            clip: clip.into(),
            position: 0.0,
            rate: 1.0,
            playing: false,
            duration: duration.max(0.0),
            ended: false,
        }
    }

    pub fn clip(&self) -> &str {
        &self.clip
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn apply(&mut self, command: &MediaCommand) {
        match command {
            MediaCommand::Play { rate } => {
                self.rate = *rate;
                self.playing = !self.ended;
            }
            MediaCommand::Pause => self.playing = false,
            MediaCommand::Load { clip, position } => {
                self.clip = clip.clone();
                self.seek(*position);
                self.playing = false;
            }
            MediaCommand::Seek { position } => self.seek(*position),
        }
    }

    pub fn advance(&mut self, dt: f64) -> Vec<MediaEvent> {
        if !self.playing || self.ended || !(dt > 0.0) {
            return Vec::new();
        }
        self.position = (self.position + dt * self.rate).min(self.duration);
        let mut events = vec![MediaEvent::TimeUpdate(self.position)];
        if self.position >= self.duration {
            self.ended = true;
            self.playing = false;
            events.push(MediaEvent::Ended);
        }
        events
    }

    fn seek(&mut self, position: f64) {
        self.position = position.clamp(0.0, self.duration);
        self.ended = false;
    }
}
