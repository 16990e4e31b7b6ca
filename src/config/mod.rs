//! Configuration module
//!
//! Handles loading listener and relay settings.

mod settings;

pub use settings::*;
