//! Speech, haptic and tone requests.
//!
//! The engine only decides *when* feedback fires. Requests are handed to a
//! [`FeedbackSink`]; delivery failures are logged and dropped so a missing controller or
//! audio device never disturbs evaluation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::Outcome;
use crate::sequence::SequenceKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HapticPattern {
    pub duration_ms: u32,
    pub weak: f32,
    pub strong: f32,
}

impl HapticPattern {
    pub const STAMP: Self = Self::new(200, 0.35, 0.8);
    pub const SUCCESS: Self = Self::new(500, 0.2, 0.6);
    pub const FAILURE: Self = Self::new(800, 0.7, 1.0);
    pub const WARNING: Self = Self::new(420, 0.5, 0.9);
    pub const COUNTDOWN: Self = Self::new(240, 0.3, 0.6);
    pub const STOP_WAIT: Self = Self::new(240, 0.4, 0.7);
    pub const RESUME_ALERT: Self = Self::new(300, 0.5, 0.8);
    pub const INDICATOR: Self = Self::new(160, 0.25, 0.6);

    pub const fn new(duration_ms: u32, weak: f32, strong: f32) -> Self {
        Self {
            duration_ms,
            weak,
            strong,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration_ms: u32,
    pub gain: f32,
}

impl Tone {
    pub const OVERSPEED: Self = Self {
        frequency_hz: 800.0,
        duration_ms: 100,
        gain: 0.3,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackRequest {
    Speak { phrase: String },
    Vibrate { pattern: HapticPattern },
    Tone { tone: Tone },
}

/// Engine happenings that have a feedback mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Cue {
    StampReached,
    Announce(String),
    IndicatorToggled,
    OutcomeReached(Outcome),
    SequenceEntered(SequenceKind),
    OverspeedAlert,
    ResumeAlert,
}

pub fn requests_for(cue: Cue) -> Vec<FeedbackRequest> {
    let vibrate = |pattern| vec![FeedbackRequest::Vibrate { pattern }];
    match cue {
        Cue::StampReached => vibrate(HapticPattern::STAMP),
        Cue::Announce(phrase) => vec![FeedbackRequest::Speak { phrase }],
        Cue::IndicatorToggled => vibrate(HapticPattern::INDICATOR),
        Cue::OutcomeReached(Outcome::Pending) => Vec::new(),
        Cue::OutcomeReached(Outcome::Success) => vibrate(HapticPattern::SUCCESS),
        Cue::OutcomeReached(_) => vibrate(HapticPattern::FAILURE),
        Cue::SequenceEntered(SequenceKind::Warning) => vibrate(HapticPattern::WARNING),
        Cue::SequenceEntered(SequenceKind::Countdown) => vibrate(HapticPattern::COUNTDOWN),
        Cue::SequenceEntered(SequenceKind::TrafficWait | SequenceKind::RedLightWait) => {
            vibrate(HapticPattern::STOP_WAIT)
        }
        Cue::OverspeedAlert => vec![FeedbackRequest::Tone {
            tone: Tone::OVERSPEED,
        }],
        Cue::ResumeAlert => vibrate(HapticPattern::RESUME_ALERT),
    }
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("no output device for {0}")]
    Unavailable(&'static str),
    #[error("output device failed: {0}")]
    Device(String),
}

pub trait FeedbackSink {
    fn deliver(&mut self, request: &FeedbackRequest) -> Result<(), FeedbackError>;
}

impl<T: FeedbackSink + ?Sized> FeedbackSink for Box<T> {
    fn deliver(&mut self, request: &FeedbackRequest) -> Result<(), FeedbackError> {
        (**self).deliver(request)
    }
}

/// Fire-and-forget: every request is attempted, failures are only logged.
pub fn dispatch<'a>(
    sink: &mut dyn FeedbackSink,
    requests: impl IntoIterator<Item = &'a FeedbackRequest>,
) {
    for request in requests {
        if let Err(err) = sink.deliver(request) {
            tracing::debug!(%err, ?request, "feedback dropped");
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FeedbackSink for TracingSink {
    fn deliver(&mut self, request: &FeedbackRequest) -> Result<(), FeedbackError> {
        match request {
            FeedbackRequest::Speak { phrase } => tracing::info!(%phrase, "speak"),
            FeedbackRequest::Vibrate { pattern } => {
                tracing::debug!(duration_ms = pattern.duration_ms, "vibrate")
            }
            FeedbackRequest::Tone { tone } => {
                tracing::debug!(frequency_hz = tone.frequency_hz, "tone")
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub delivered: Vec<FeedbackRequest>,
}

impl RecordingSink {
    pub fn phrases(&self) -> Vec<&str> {
        self.delivered
            .iter()
            .filter_map(|r| match r {
                FeedbackRequest::Speak { phrase } => Some(phrase.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn vibrations(&self) -> Vec<HapticPattern> {
        self.delivered
            .iter()
            .filter_map(|r| match r {
                FeedbackRequest::Vibrate { pattern } => Some(*pattern),
                _ => None,
            })
            .collect()
    }
}

impl FeedbackSink for RecordingSink {
    fn deliver(&mut self, request: &FeedbackRequest) -> Result<(), FeedbackError> {
        self.delivered.push(request.clone());
        Ok(())
    }
}

/// Renders tones on the default audio output; speech and haptics go to `fallback`.
#[cfg(feature = "audio")]
pub struct AudioSink<S: FeedbackSink> {
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    fallback: S,
}

#[cfg(feature = "audio")]
impl<S: FeedbackSink> AudioSink<S> {
    pub fn try_new(fallback: S) -> Result<Self, FeedbackError> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|err| FeedbackError::Device(err.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
            fallback,
        })
    }
}

#[cfg(feature = "audio")]
impl<S: FeedbackSink> FeedbackSink for AudioSink<S> {
    fn deliver(&mut self, request: &FeedbackRequest) -> Result<(), FeedbackError> {
        use rodio::Source;
        use std::time::Duration;

        let FeedbackRequest::Tone { tone } = request else {
            return self.fallback.deliver(request);
        };
        let sink = rodio::Sink::try_new(&self.handle)
            .map_err(|err| FeedbackError::Device(err.to_string()))?;
        sink.set_volume(tone.gain);
        sink.append(
            rodio::source::SineWave::new(tone.frequency_hz)
                .take_duration(Duration::from_millis(u64::from(tone.duration_ms))),
        );
        sink.detach();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl FeedbackSink for Broken {
        fn deliver(&mut self, _request: &FeedbackRequest) -> Result<(), FeedbackError> {
            Err(FeedbackError::Unavailable("test"))
        }
    }

    #[test]
    fn outcome_patterns_distinguish_success() {
        assert_eq!(
            requests_for(Cue::OutcomeReached(Outcome::Success)),
            vec![FeedbackRequest::Vibrate {
                pattern: HapticPattern::SUCCESS
            }]
        );
        assert_eq!(
            requests_for(Cue::OutcomeReached(Outcome::Overspeed)),
            vec![FeedbackRequest::Vibrate {
                pattern: HapticPattern::FAILURE
            }]
        );
        assert!(requests_for(Cue::OutcomeReached(Outcome::Pending)).is_empty());
    }

    #[test]
    fn sequences_have_distinct_pulses() {
        let warning = requests_for(Cue::SequenceEntered(SequenceKind::Warning));
        let countdown = requests_for(Cue::SequenceEntered(SequenceKind::Countdown));
        let wait = requests_for(Cue::SequenceEntered(SequenceKind::TrafficWait));
        assert_ne!(warning, countdown);
        assert_ne!(countdown, wait);
    }

    #[test]
    fn dispatch_swallows_sink_failures() {
        let requests = requests_for(Cue::OverspeedAlert);
        dispatch(&mut Broken, &requests);

        let mut recorder = RecordingSink::default();
        dispatch(&mut recorder, &requests);
        assert_eq!(recorder.delivered.len(), 1);
    }
}
