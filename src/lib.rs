//! Passive battery and case status scanner for `AirPods` and Beats.
//!
//! Accessories broadcast a proximity-pairing advertisement carrying earbud
//! and case battery levels, charging state and lid state. This crate
//! filters those frames out of the vendor's manufacturer data, decodes
//! them and hands every result to the subscribers of an [`EventHub`].

pub mod airpods;
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod event;
pub mod scanner;

pub use airpods::{
   filter::FrameFilter,
   parser::{ProtoError, ResolutionHeuristic, StatusDecoder},
   protocol::{CaseStatus, DecodedStatus, DeviceInfo, PodStatus},
   registry::DeviceRegistry,
};
pub use bluetooth::scan::{BluerScanSource, RawEvent, ScanConfig, ScanSource};
pub use error::{Result, ScanError};
pub use event::{Delivery, EventBus, EventHub, EventSender, Subscriber};
pub use scanner::{BatteryScanner, Outcome, ScanStats};
