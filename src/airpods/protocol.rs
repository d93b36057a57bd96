//! Proximity-pairing advertisement definitions and decoded status types.
//!
//! This module contains the framing constants, flag layouts and the
//! structured status value produced for every decoded advertisement.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use smol_str::SmolStr;

/// Apple company ID for manufacturer data
pub const APPLE_CID: u16 = 0x004C;

/// Proximity-pairing message type, the first byte of a status frame
pub const PP_TYPE: u8 = 0x07;

/// Payload length marker carried in the second byte of a status frame
pub const PP_LEN: u8 = 0x19;

/// Smallest buffer holding every field the decoder reads (bytes 0..=22)
pub const MIN_FRAME_LEN: usize = 23;

// Byte offsets inside a status frame
pub const OFF_MODEL_LO: usize = 3;
pub const OFF_MODEL_HI: usize = 4;
pub const OFF_FLAGS: usize = 5;
pub const OFF_LOW_RES_PODS: usize = 6;
pub const OFF_LOW_RES_CASE: usize = 7;
pub const OFF_LID: usize = 8;
pub const OFF_HIGH_RES: usize = 12;
pub const OFF_RESOLUTION: usize = 21;

/// Message types found in the first byte of Apple manufacturer data.
#[repr(u8)]
#[derive(
   Debug,
   Clone,
   Copy,
   PartialEq,
   Eq,
   strum::FromRepr,
   strum::Display,
   strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ContinuityType {
   AirPrint = 0x03,
   AirDrop = 0x05,
   HomeKit = 0x06,
   #[strum(serialize = "airpods")]
   ProximityPairing = 0x07,
   Siri = 0x08,
   AirPlay = 0x09,
   #[strum(serialize = "watch_c")]
   WatchConnection = 0x0b,
   Handoff = 0x0c,
   #[strum(serialize = "wifi_set")]
   WifiSet = 0x0d,
   Hotspot = 0x0e,
   #[strum(serialize = "wifi_join")]
   WifiJoin = 0x0f,
   Nearby = 0x10,
}

/// Flags byte (offset 5) of a status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
   pub left_first: bool,
   pub has_case_data: bool,
   pub connected: bool,
   pub has_other: bool,
}

impl StatusFlags {
   pub const LEFT_FIRST: u8 = 1 << 5;
   pub const CASE_DATA: u8 = 1 << 4;
   pub const CONNECTED: u8 = 1 << 1;
   pub const OTHER: u8 = 1 << 0;

   pub const fn from_byte(b: u8) -> Self {
      Self {
         left_first: b & Self::LEFT_FIRST != 0,
         has_case_data: b & Self::CASE_DATA != 0,
         connected: b & Self::CONNECTED != 0,
         has_other: b & Self::OTHER != 0,
      }
   }
}

/// Lid byte (offset 8) of a status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LidStatus {
   pub open: bool,
   pub counter: u8,
}

impl LidStatus {
   pub const CLOSED: u8 = 1 << 3;
   pub const COUNTER_MASK: u8 = 0b0000_0111;

   pub const fn from_byte(b: u8) -> Self {
      Self {
         open: b & Self::CLOSED == 0,
         counter: b & Self::COUNTER_MASK,
      }
   }
}

/// Which encoding the battery fields of a frame use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Resolution {
   /// 7-bit percentages at offsets 12..=14
   High,
   /// Nibble-packed tenths at offsets 6..=7
   Low,
}

impl Resolution {
   pub const fn is_decrypted(self) -> bool {
      matches!(self, Self::High)
   }
}

/// Identity of the advertising accessory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
   pub id: u16,
   pub name: SmolStr,
   pub decrypted: bool,
   pub connected: bool,
}

/// Charging state and level of a single earbud, or of the case.
///
/// `battery` is kept exactly as encoded: 0-127 for high resolution frames,
/// a multiple of 10 up to 150 for low resolution frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
   pub charging: bool,
   pub battery: u8,
}

impl PodStatus {
   /// Battery level limited to a displayable percentage.
   pub fn clamped_battery(&self) -> u8 {
      self.battery.min(100)
   }
}

/// Case telemetry, or the placeholder emitted when the frame carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
   Reported {
      charging: bool,
      battery: u8,
      lid_open: bool,
      lid_open_counter: u8,
   },
   /// No case data in the frame; the lid is reported open.
   Absent,
}

impl CaseStatus {
   pub const fn lid_open(&self) -> bool {
      match self {
         Self::Reported { lid_open, .. } => *lid_open,
         Self::Absent => true,
      }
   }

   pub fn to_json(self) -> Value {
      match self {
         Self::Reported {
            charging,
            battery,
            lid_open,
            lid_open_counter,
         } => json!({
             "charging": charging,
             "battery": u32::from(battery),
             "lidOpen": lid_open,
             "lidOpenCounter": u32::from(lid_open_counter),
         }),
         Self::Absent => json!({ "lidOpen": true }),
      }
   }
}

/// Complete status decoded from one advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedStatus {
   pub device: DeviceInfo,
   pub left: Option<PodStatus>,
   pub right: Option<PodStatus>,
   pub case: CaseStatus,
}

impl DecodedStatus {
   pub fn to_json(&self) -> Value {
      let pod = |p: PodStatus| {
         json!({
             "charging": p.charging,
             "battery": u32::from(p.battery),
         })
      };

      let mut obj = Map::new();
      obj.insert(
         "device".into(),
         json!({
             "id": u32::from(self.device.id),
             "name": self.device.name.as_str(),
             "decrypted": self.device.decrypted,
             "connected": self.device.connected,
         }),
      );
      if let Some(left) = self.left {
         obj.insert("left".into(), pod(left));
      }
      if let Some(right) = self.right {
         obj.insert("right".into(), pod(right));
      }
      obj.insert("case".into(), self.case.to_json());
      Value::Object(obj)
   }
}
