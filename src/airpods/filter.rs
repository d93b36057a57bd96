//! Selection of proximity-pairing status frames from manufacturer data.
//!
//! Apple devices share one company identifier for many unrelated
//! continuity messages; only frames carrying the status type and length
//! markers are passed on to the decoder.

use std::collections::HashMap;

use log::trace;

use crate::airpods::protocol::{APPLE_CID, ContinuityType, PP_LEN, PP_TYPE};

/// Predicate for recognised status frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFilter {
   pub company_id: u16,
   pub subtype: u8,
   pub length: u8,
}

impl Default for FrameFilter {
   fn default() -> Self {
      Self {
         company_id: APPLE_CID,
         subtype: PP_TYPE,
         length: PP_LEN,
      }
   }
}

impl FrameFilter {
   /// Returns `data` if it is a status frame from the expected vendor.
   pub fn accept<'a>(&self, company_id: u16, data: &'a [u8]) -> Option<&'a [u8]> {
      if company_id != self.company_id {
         return None;
      }
      match data {
         [subtype, length, ..] if *subtype == self.subtype && *length == self.length => Some(data),
         [subtype, ..] => {
            trace!(
               "Ignoring {} message (type 0x{subtype:02x}, {} bytes)",
               ContinuityType::from_repr(*subtype)
                  .map_or("unknown", <&'static str>::from),
               data.len()
            );
            None
         },
         [] => None,
      }
   }

   /// Picks the vendor's entry out of a manufacturer data map and filters it.
   /// All other company identifiers are ignored.
   pub fn select<'a, B>(&self, manufacturer_data: &'a HashMap<u16, B>) -> Option<&'a [u8]>
   where
      B: AsRef<[u8]>,
   {
      let data = manufacturer_data.get(&self.company_id)?;
      self.accept(self.company_id, data.as_ref())
   }
}
