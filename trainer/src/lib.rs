pub mod catalog;
pub mod driver;
pub mod error;
pub mod feedback;
pub mod input;
pub mod level;
pub mod logging;
pub mod media;
pub mod rate;
pub mod recorder;
pub mod remote;
pub mod rules;
pub mod sequence;
pub mod serde_duration;
pub mod session;
pub mod settings;
pub mod state;
pub mod timeline;
pub mod view;

pub use error::{Result, TrainerError};
