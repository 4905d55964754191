// src/utils/mod.rs
//! Configuration and error types shared by every module

pub mod config;
pub mod errors;

pub use self::config::ForwarderConfig;
pub use self::errors::{ForwarderError, Result};
