//! Bluetooth scanning layer.
//!
//! This module provides the advertisement scanning capability and its
//! `BlueZ` backed implementation.

pub mod scan;
