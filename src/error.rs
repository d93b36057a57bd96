//! Error types for the scanner.
//!
//! This module defines all error types that can occur while scanning,
//! including Bluetooth, I/O, configuration and protocol errors.

use thiserror::Error;

use crate::airpods::parser::ProtoError;

/// Main error type for the scanner.
#[derive(Error, Debug)]
pub enum ScanError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("Protocol error: {0}")]
   Proto(#[from] ProtoError),

   #[error("Adapter not found: {0}")]
   AdapterNotFound(String),

   #[error("Scan session ended")]
   ScanSessionEnded,

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `ScanError`.
pub type Result<T> = std::result::Result<T, ScanError>;
