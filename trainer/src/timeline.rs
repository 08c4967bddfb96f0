use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::level::{HintCategory, LevelDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimelineEvent {
    StampReached { index: usize, stamp: f64 },
    WindowChanged { category: HintCategory, visible: bool },
    /// First entry into a hint window during this attempt.
    Announce(HintCategory),
}

/// What the attempt knows about the media timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    position: f64,
    clip: String,
    sampled: bool,
    ended: bool,
    crossed: BTreeSet<usize>,
    announced: BTreeSet<HintCategory>,
    visible: BTreeSet<HintCategory>,
}

impl TimelineState {
    pub fn new(clip: impl Into<String>) -> Self {
        Self {
            position: 0.0,
            clip: clip.into(),
            sampled: false,
            ended: false,
            crossed: BTreeSet::new(),
            announced: BTreeSet::new(),
            visible: BTreeSet::new(),
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn clip(&self) -> &str {
        &self.clip
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn is_visible(&self, category: HintCategory) -> bool {
        self.visible.contains(&category)
    }

    pub fn visible(&self) -> impl Iterator<Item = HintCategory> + '_ {
        self.visible.iter().copied()
    }

    pub fn crossed_stamps(&self) -> &BTreeSet<usize> {
        &self.crossed
    }

    /// Handles one media time-update.
    pub fn sample(&mut self, level: &LevelDefinition, t: f64) -> Vec<TimelineEvent> {
        if self.ended || !t.is_finite() {
            return Vec::new();
        }
        if self.sampled && t < self.position {
            tracing::debug!(position = self.position, tick = t, "ignoring stale media tick");
            return Vec::new();
        }
        self.sampled = true;
        self.position = t;

        let mut events = Vec::new();
        for (index, stamp) in level.vibration_stamps.iter().copied().enumerate() {
            if t >= stamp && self.crossed.insert(index) {
                events.push(TimelineEvent::StampReached { index, stamp });
            }
        }

        for (category, window) in level.hint_windows() {
            let inside = window.contains(t);
            if inside == self.visible.contains(&category) {
                continue;
            }
            if inside {
                self.visible.insert(category);
            } else {
                self.visible.remove(&category);
            }
            events.push(TimelineEvent::WindowChanged {
                category,
                visible: inside,
            });
            if inside && self.announced.insert(category) {
                events.push(TimelineEvent::Announce(category));
            }
        }
        events
    }

    /// Media finished; hint banners are withdrawn and later samples are ignored.
    pub fn end(&mut self) {
        self.ended = true;
        self.visible.clear();
    }

    /// Source switch or seek issued by the engine itself. Crossed stamps stay crossed.
    pub fn relocate(&mut self, clip: Option<&str>, position: f64) {
        if let Some(clip) = clip {
            self.clip = clip.to_string();
        }
        if position.is_finite() {
            self.position = position.max(0.0);
        }
        self.ended = false;
    }
}
