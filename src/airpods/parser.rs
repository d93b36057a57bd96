//! Decoder for proximity-pairing status frames.
//!
//! A status frame arrives in one of two encodings. When the advertiser has
//! a key shared with this host the battery levels are plain 7-bit
//! percentages, otherwise only nibble-packed tenths are available.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::airpods::{
   protocol::{
      CaseStatus, DecodedStatus, DeviceInfo, LidStatus, MIN_FRAME_LEN, OFF_FLAGS, OFF_HIGH_RES,
      OFF_LID, OFF_LOW_RES_CASE, OFF_LOW_RES_PODS, OFF_MODEL_HI, OFF_MODEL_LO, OFF_RESOLUTION,
      PodStatus, Resolution, StatusFlags,
   },
   registry::DeviceRegistry,
};

/// Error type for protocol parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
   /// Status frame too short for the fields it must carry
   #[error("Malformed frame: expected at least {expected} bytes, got {actual}")]
   MalformedFrame { expected: usize, actual: usize },
}

/// How the decoder picks between the two battery encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionHeuristic {
   /// High resolution when bytes 21 and 22 are both zero.
   #[default]
   TrailingZeros,
   /// Always read the nibble-packed fields.
   AlwaysLow,
}

impl ResolutionHeuristic {
   /// Classifies a frame already checked to be at least `MIN_FRAME_LEN` long.
   pub fn detect(self, data: &[u8]) -> Resolution {
      match self {
         Self::TrailingZeros => trailing_zeros_resolution(data),
         Self::AlwaysLow => Resolution::Low,
      }
   }
}

/// Bytes 21 and 22 have only been observed as zero in frames whose battery
/// triple is readable. Unverified; misclassification is possible.
fn trailing_zeros_resolution(data: &[u8]) -> Resolution {
   match data[OFF_RESOLUTION..OFF_RESOLUTION + 2] {
      [0, 0] => Resolution::High,
      _ => Resolution::Low,
   }
}

/// Battery values in frame order, before orientation is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Readings {
   first: PodStatus,
   second: PodStatus,
   case: PodStatus,
}

impl Readings {
   const CHARGING: u8 = 0x80;
   const LEVEL_MASK: u8 = 0x7f;

   const LOW_FIRST_CHARGING: u8 = 1 << 4;
   const LOW_SECOND_CHARGING: u8 = 1 << 5;
   const LOW_CASE_CHARGING: u8 = 1 << 6;

   fn high_res(data: &[u8]) -> Self {
      let read = |b: u8| PodStatus {
         charging: b & Self::CHARGING != 0,
         battery: b & Self::LEVEL_MASK,
      };
      Self {
         first: read(data[OFF_HIGH_RES]),
         second: read(data[OFF_HIGH_RES + 1]),
         case: read(data[OFF_HIGH_RES + 2]),
      }
   }

   fn low_res(data: &[u8]) -> Self {
      let pods = data[OFF_LOW_RES_PODS];
      let flags = data[OFF_LOW_RES_CASE];
      Self {
         first: PodStatus {
            charging: flags & Self::LOW_FIRST_CHARGING != 0,
            battery: (pods >> 4) * 10,
         },
         second: PodStatus {
            charging: flags & Self::LOW_SECOND_CHARGING != 0,
            battery: (pods & 0x0f) * 10,
         },
         case: PodStatus {
            charging: flags & Self::LOW_CASE_CHARGING != 0,
            battery: (flags & 0x0f) * 10,
         },
      }
   }
}

/// Stateless status frame decoder.
#[derive(Debug, Clone)]
pub struct StatusDecoder {
   registry: Arc<DeviceRegistry>,
   heuristic: ResolutionHeuristic,
}

impl StatusDecoder {
   pub fn new(registry: Arc<DeviceRegistry>) -> Self {
      Self {
         registry,
         heuristic: ResolutionHeuristic::default(),
      }
   }

   #[must_use]
   pub fn with_heuristic(mut self, heuristic: ResolutionHeuristic) -> Self {
      self.heuristic = heuristic;
      self
   }

   pub fn registry(&self) -> &DeviceRegistry {
      &self.registry
   }

   /// Decodes a status frame accepted by the frame filter.
   ///
   /// Fails only when `data` is too short to hold every field read.
   pub fn decode(&self, data: &[u8]) -> Result<DecodedStatus, ProtoError> {
      if data.len() < MIN_FRAME_LEN {
         return Err(ProtoError::MalformedFrame {
            expected: MIN_FRAME_LEN,
            actual: data.len(),
         });
      }

      let id = u16::from_le_bytes([data[OFF_MODEL_LO], data[OFF_MODEL_HI]]);
      let flags = StatusFlags::from_byte(data[OFF_FLAGS]);
      let lid = LidStatus::from_byte(data[OFF_LID]);
      let resolution = self.heuristic.detect(data);

      let readings = match resolution {
         Resolution::High => Readings::high_res(data),
         Resolution::Low => Readings::low_res(data),
      };

      let (left, right) = match (flags.left_first, flags.has_other) {
         (true, true) => (Some(readings.first), Some(readings.second)),
         (true, false) => (Some(readings.first), None),
         (false, true) => (Some(readings.second), Some(readings.first)),
         (false, false) => (None, Some(readings.first)),
      };

      let case = match flags.has_case_data {
         true => CaseStatus::Reported {
            charging: readings.case.charging,
            battery: readings.case.battery,
            lid_open: lid.open,
            lid_open_counter: lid.counter,
         },
         false => CaseStatus::Absent,
      };

      let status = DecodedStatus {
         device: DeviceInfo {
            id,
            name: self.registry.resolve_name(id),
            decrypted: resolution.is_decrypted(),
            connected: flags.connected,
         },
         left,
         right,
         case,
      };
      debug!("Status parsed ({resolution} resolution) - {status:?}");
      Ok(status)
   }
}
