//! `AirPods` advertisement decoding.
//!
//! This module contains the proximity-pairing frame definitions, the frame
//! filter, the model registry and the status decoder.

pub mod filter;
pub mod parser;
pub mod protocol;
pub mod registry;
