//! restyle: prompt-driven image transformation service.
//!
//! Accepts an image and a prompt, hands them to a hosted predictor, polls
//! until the result is ready and records it for later status lookups.

mod error;
mod job;
mod version;

pub mod config;
pub mod normalize;
pub mod orchestrator;
pub mod poller;
pub mod predictor;
pub mod publish;
pub mod service;
pub mod status;
pub mod store;
pub mod transport;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, ConfigError};
pub use error::JobError;
pub use job::{JobOutcome, JobRequest, JobSubmission, JobToken, PredictionStatus, extract_artifact};
pub use orchestrator::JobOrchestrator;
pub use poller::{PollConfig, ResultPoller, Sleeper, TokioSleeper};
pub use predictor::{Predictor, PredictorConfig, ReplicateClient, StatusReport, StatusSource};
pub use service::RestyleService;
pub use status::{JobStatus, StatusService};
pub use store::{MemorySessionStore, SessionStore};
pub use version::{RESTYLE_VERSION, VersionInfo};
