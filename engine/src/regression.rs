//! Engine-level regression helpers.
//!
//! These utilities help you:
//! - digest a serializable state (sha256 over its JSON encoding),
//! - trace a journal of inputs into one digest per step, and
//! - replay the same journal a second time and assert every step digest matches, or
//!   compare the trace against a golden JSON file on disk.
//!
//! The engine stays game-agnostic: anything implementing `TickLogic` with a
//! `Serialize` state can be checked.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{HeadlessRunner, TickLogic};

/// Environment flag helper: accepts `1/true/yes/on` (case-insensitive).
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// If set, regression checks may update golden files in-place.
pub fn update_goldens_enabled() -> bool {
    env_flag("TRAINER_UPDATE_GOLDENS")
}

pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to encode state for digest: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("step count mismatch: expected {expected} digests, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("state digest mismatch at step {step}:\nexpected: {expected}\nactual:   {actual}")]
    Mismatch {
        step: usize,
        expected: String,
        actual: String,
    },
    #[error("golden file {path}: {source}")]
    Golden {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub fn state_digest<S: Serialize>(state: &S) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(state)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of the initial state followed by one digest per applied input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayTrace {
    pub digests: Vec<String>,
}

impl ReplayTrace {
    pub fn final_digest(&self) -> Option<&str> {
        self.digests.last().map(String::as_str)
    }

    pub fn compare(&self, expected: &ReplayTrace) -> Result<(), ReplayError> {
        if expected.digests.len() != self.digests.len() {
            return Err(ReplayError::Length {
                expected: expected.digests.len(),
                actual: self.digests.len(),
            });
        }
        for (step, (a, b)) in expected.digests.iter().zip(&self.digests).enumerate() {
            if a != b {
                return Err(ReplayError::Mismatch {
                    step,
                    expected: a.clone(),
                    actual: b.clone(),
                });
            }
        }
        Ok(())
    }
}

pub fn trace<G>(logic: G, inputs: &[G::Input]) -> Result<ReplayTrace, ReplayError>
where
    G: TickLogic,
    G::State: Serialize,
    G::Input: Clone,
{
    let mut runner = HeadlessRunner::new(logic);
    let mut digests = Vec::with_capacity(inputs.len() + 1);
    digests.push(state_digest(runner.state())?);
    for input in inputs {
        runner.step(input.clone());
        runner.drain_effects();
        digests.push(state_digest(runner.state())?);
    }
    Ok(ReplayTrace { digests })
}

/// Runs the journal twice from scratch and fails on the first diverging step.
pub fn assert_replay_deterministic<G>(logic: G, inputs: &[G::Input]) -> Result<ReplayTrace, ReplayError>
where
    G: TickLogic + Clone,
    G::State: Serialize,
    G::Input: Clone,
{
    let live = trace(logic.clone(), inputs)?;
    let replay = trace(logic, inputs)?;
    replay.compare(&live)?;
    Ok(live)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceGolden {
    pub version: u32,
    pub name: String,
    pub hash_alg: String,
    pub trace: ReplayTrace,
}

impl TraceGolden {
    pub fn new(name: impl Into<String>, trace: ReplayTrace) -> Self {
        Self {
            version: 1,
            name: name.into(),
            hash_alg: "sha256".to_string(),
            trace,
        }
    }
}

pub fn load_golden_json(path: impl AsRef<Path>) -> io::Result<TraceGolden> {
    let path = path.as_ref();
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("failed parsing golden json {}: {e}", path.display()),
        )
    })
}

pub fn save_golden_json(path: impl AsRef<Path>, golden: &TraceGolden) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, golden).map_err(io::Error::other)?;
    writer.flush()?;
    Ok(())
}

/// Writes the golden when missing (or when `update` is set), otherwise compares.
pub fn assert_or_update_golden_json(
    path: impl AsRef<Path>,
    golden: &TraceGolden,
    update: bool,
) -> Result<(), ReplayError> {
    let path = path.as_ref();
    let golden_err = |source| ReplayError::Golden {
        path: path.to_path_buf(),
        source,
    };

    if update || !path.exists() {
        save_golden_json(path, golden).map_err(golden_err)?;
        tracing::info!(path = %path.display(), "wrote replay golden");
        return Ok(());
    }

    let expected = load_golden_json(path).map_err(golden_err)?;
    if expected.version != golden.version || expected.hash_alg != golden.hash_alg {
        return Err(golden_err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "golden metadata mismatch: expected v{} alg={}, actual v{} alg={} (hint: set TRAINER_UPDATE_GOLDENS=1 to rewrite)",
                expected.version, expected.hash_alg, golden.version, golden.hash_alg
            ),
        )));
    }
    golden.trace.compare(&expected.trace)
}
