//! Shared utilities for the address verification engine.

pub mod logging;

pub use logging::{init_logging, LogFormat, UnknownLogFormat};
