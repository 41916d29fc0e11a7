//! # TuneFlow Common Library
//!
//! Shared code for the TuneFlow tracker and its collaborators:
//! - Playback event wire types and the in-process event bus
//! - Configuration loading and validation
//! - Error types
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{ListenStatus, PlaybackEvent, ProcessingPath};
