//! Artifact collection strategies.
//!
//! A log descriptor's kind fully determines its strategy: whole-file
//! copy, tail-N-lines extraction, device-node drain, or captured
//! command output. Pattern sources expand to many files first.

pub mod log_collector;
pub mod patterns;
