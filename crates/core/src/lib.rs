//! Shared foundations for the Ember renderer crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Configuration loading

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    ConfigSource, EngineConfig, LoadedConfig, LoggingConfig, RendererConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
