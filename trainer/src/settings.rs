use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Control tuning: how taps, holds and device axes move the rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlSettings {
    pub tap_step: f64,
    pub hold_step: f64,
    #[serde(with = "crate::serde_duration")]
    pub hold_interval: Duration,
    pub steer_threshold: f64,
    pub pedal_deadzone: f64,
    pub pedal_gain: f64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            tap_step: 0.25,
            hold_step: 0.1,
            hold_interval: Duration::from_millis(150),
            steer_threshold: 0.3,
            pedal_deadzone: 0.1,
            pedal_gain: 0.1,
        }
    }
}

impl ControlSettings {
    pub fn clamp(mut self) -> Self {
        let defaults = Self::default();
        self.tap_step = finite_or(self.tap_step, defaults.tap_step).clamp(0.01, 2.0);
        self.hold_step = finite_or(self.hold_step, defaults.hold_step).clamp(0.01, 2.0);
        self.hold_interval = self
            .hold_interval
            .clamp(Duration::from_millis(16), Duration::from_secs(2));
        self.steer_threshold =
            finite_or(self.steer_threshold, defaults.steer_threshold).clamp(0.05, 0.95);
        self.pedal_deadzone =
            finite_or(self.pedal_deadzone, defaults.pedal_deadzone).clamp(0.0, 0.9);
        self.pedal_gain = finite_or(self.pedal_gain, defaults.pedal_gain).clamp(0.0, 1.0);
        self
    }
}

/// Lengths of the scripted sequences and alert pacing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingSettings {
    #[serde(with = "crate::serde_duration")]
    pub warning_countdown: Duration,
    #[serde(with = "crate::serde_duration")]
    pub stop_wait: Duration,
    #[serde(with = "crate::serde_duration")]
    pub resume_alert: Duration,
    #[serde(with = "crate::serde_duration")]
    pub overspeed_alert_interval: Duration,
    #[serde(with = "crate::serde_duration")]
    pub overspeed_flash: Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            warning_countdown: Duration::from_secs(3),
            stop_wait: Duration::from_secs(5),
            resume_alert: Duration::from_secs(2),
            overspeed_alert_interval: Duration::from_millis(500),
            overspeed_flash: Duration::from_millis(300),
        }
    }
}

impl TimingSettings {
    pub fn clamp(mut self) -> Self {
        let max = Duration::from_secs(60);
        self.warning_countdown = self.warning_countdown.clamp(Duration::from_secs(1), max);
        self.stop_wait = self.stop_wait.clamp(Duration::from_secs(1), max);
        self.resume_alert = self.resume_alert.min(max);
        self.overspeed_alert_interval = self
            .overspeed_alert_interval
            .clamp(Duration::from_millis(50), max);
        self.overspeed_flash = self.overspeed_flash.min(max);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    #[serde(with = "crate::serde_duration")]
    pub poll_interval: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8787,
            // ~20 Hz device poll.
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainerConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub controls: ControlSettings,
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            controls: ControlSettings::default(),
            timing: TimingSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl TrainerConfig {
    pub fn sanitized(mut self) -> Self {
        self.version = default_version();
        self.controls = self.controls.clamp();
        self.timing = self.timing.clamp();
        self.server.poll_interval = self
            .server
            .poll_interval
            .clamp(Duration::from_millis(10), Duration::from_secs(1));
        self
    }
}

fn default_version() -> u32 {
    1
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    pub fn from_lookup(mut lookup: impl FnMut(&str) -> Option<OsString>) -> Self {
        if let Some(explicit) = lookup("TRAINER_CONFIG_PATH") {
            return Self {
                path: PathBuf::from(explicit),
            };
        }

        let base = lookup("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                lookup("HOME").map(|home| {
                    let mut p = PathBuf::from(home);
                    p.push(".config");
                    p
                })
            })
            .unwrap_or_else(|| PathBuf::from("."));

        let mut path = base;
        path.push("driving-trainer");
        path.push("config.json");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> TrainerConfig {
        let Ok(bytes) = fs::read(&self.path) else {
            return TrainerConfig::default();
        };
        match serde_json::from_slice::<TrainerConfig>(&bytes) {
            Ok(config) => config.sanitized(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "ignoring malformed trainer config");
                TrainerConfig::default()
            }
        }
    }

    pub fn save(&self, config: &TrainerConfig) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_clamps_out_of_range_values() {
        let config = TrainerConfig {
            version: 42,
            controls: ControlSettings {
                tap_step: 9.0,
                hold_step: f64::NAN,
                hold_interval: Duration::ZERO,
                steer_threshold: 2.0,
                pedal_deadzone: -1.0,
                pedal_gain: 0.1,
            },
            ..TrainerConfig::default()
        }
        .sanitized();

        assert_eq!(config.version, 1);
        assert_eq!(config.controls.tap_step, 2.0);
        assert_eq!(config.controls.hold_step, 0.1);
        assert_eq!(config.controls.hold_interval, Duration::from_millis(16));
        assert_eq!(config.controls.steer_threshold, 0.95);
        assert_eq!(config.controls.pedal_deadzone, 0.0);
    }

    #[test]
    fn serde_defaults_fill_missing_sections() {
        let parsed: TrainerConfig =
            serde_json::from_str(r#"{"timing":{"warning_countdown":4000,"stop_wait":5000,"resume_alert":2000,"overspeed_alert_interval":500,"overspeed_flash":300}}"#)
                .expect("config JSON should parse");
        assert_eq!(parsed.controls, ControlSettings::default());
        assert_eq!(parsed.server, ServerSettings::default());
        assert_eq!(parsed.timing.warning_countdown, Duration::from_secs(4));
    }

    #[test]
    fn partial_sections_keep_their_other_defaults() {
        let parsed: TrainerConfig = serde_json::from_str(
            r#"{"timing":{"stop_wait":7000},"controls":{"tap_step":0.5},"server":{"port":9000}}"#,
        )
        .expect("partial config should parse");
        assert_eq!(parsed.timing.stop_wait, Duration::from_secs(7));
        assert_eq!(parsed.timing.warning_countdown, Duration::from_secs(3));
        assert_eq!(parsed.controls.tap_step, 0.5);
        assert_eq!(parsed.controls.hold_interval, Duration::from_millis(150));
        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.server.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn partial_file_loads_instead_of_falling_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"timing":{"stop_wait":7000}}"#).expect("write");
        let config = ConfigStore::new(&path).load();
        assert_eq!(config.timing.stop_wait, Duration::from_secs(7));
        assert_eq!(config.controls, ControlSettings::default());
    }

    #[test]
    fn lookup_prefers_explicit_path_then_xdg() {
        let explicit = ConfigStore::from_lookup(|key| {
            (key == "TRAINER_CONFIG_PATH").then(|| OsString::from("/tmp/custom.json"))
        });
        assert_eq!(explicit.path(), Path::new("/tmp/custom.json"));

        let xdg = ConfigStore::from_lookup(|key| {
            (key == "XDG_CONFIG_HOME").then(|| OsString::from("/cfg"))
        });
        assert_eq!(xdg.path(), Path::new("/cfg/driving-trainer/config.json"));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("missing.json"));
        assert_eq!(store.load(), TrainerConfig::default());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").expect("write");
        assert_eq!(ConfigStore::new(&broken).load(), TrainerConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));
        let mut config = TrainerConfig::default();
        config.timing.stop_wait = Duration::from_secs(7);
        store.save(&config).expect("save");
        assert_eq!(store.load(), config);
    }
}
