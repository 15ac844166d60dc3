//! Turn-based spoken dialogue: a recognition leg that segments microphone
//! audio into transcripts, and an orchestrator that answers each transcript
//! with generated, synthesized speech while the leg is paused.

pub mod audio;
pub mod config;
pub mod error;
pub mod kernel;
pub mod orchestrator;
pub mod pipeline;
pub mod recognition;
pub mod services;

pub use config::Config;
pub use error::{PipelineError, PipelineResult};
pub use orchestrator::Orchestrator;
