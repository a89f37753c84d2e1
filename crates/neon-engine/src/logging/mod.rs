//! Logging setup.
//!
//! The engine logs through the `log` facade only; `env_logger` is wired up
//! here for binaries that want a ready-made backend.

mod init;

pub use init::{init_logging, LoggingConfig, DEFAULT_FILTER};
