//! Pipeline telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a read-only side-effect layer. It is never consulted by
//! the segmentation, turn-taking or synthesis logic.
//!
//! # PRIVACY INVARIANT
//! Events never carry user content (transcripts, generated text, audio).
//! Only ids, durations, counts and classifications are recorded.

pub mod event;
pub mod metrics;
pub mod recorder;
