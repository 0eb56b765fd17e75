//! Core utilities for the carousel renderer.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame clock for per-tick timing

mod clock;
mod error;
mod logging;

pub use clock::FrameClock;
pub use error::{Error, Result};
pub use logging::init_logging;
