//! # cp-common
//!
//! Shared configuration, logging setup and error types for the checkpoint
//! realtime workspace.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{AppConfig, BrokerConfig, RealtimeConfig, TransportMode};
pub use error::{AppError, AppResult};
