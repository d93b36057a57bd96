//! Advertisement to status pipeline.
//!
//! The scanner pulls raw advertisements from a [`ScanSource`], keeps the
//! vendor's status frames, decodes them and publishes the result.

use std::{
   convert::Infallible,
   sync::{
      Arc,
      atomic::{AtomicU64, Ordering},
   },
};

use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
   airpods::{
      filter::FrameFilter,
      parser::{ProtoError, ResolutionHeuristic, StatusDecoder},
      registry::DeviceRegistry,
   },
   bluetooth::scan::{RawEvent, ScanConfig, ScanSource},
   error::{Result, ScanError},
   event::EventSender,
};

/// What happened to one advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
   /// Not a status frame from the expected vendor
   Ignored,
   /// Status frame too short to decode
   Malformed(ProtoError),
   /// Decoded and handed to subscribers
   Published,
}

/// Counters since the scanner was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
   pub seen: u64,
   pub accepted: u64,
   pub ignored: u64,
   pub malformed: u64,
   pub published: u64,
   pub subscriber_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
   seen: AtomicU64,
   accepted: AtomicU64,
   ignored: AtomicU64,
   malformed: AtomicU64,
   published: AtomicU64,
   subscriber_failures: AtomicU64,
}

/// Decodes advertisements and publishes battery status.
pub struct BatteryScanner {
   filter: FrameFilter,
   decoder: StatusDecoder,
   events: EventSender,
   counters: Counters,
}

impl BatteryScanner {
   pub fn new(registry: Arc<DeviceRegistry>, events: EventSender) -> Self {
      Self {
         filter: FrameFilter::default(),
         decoder: StatusDecoder::new(registry),
         events,
         counters: Counters::default(),
      }
   }

   #[must_use]
   pub fn with_heuristic(mut self, heuristic: ResolutionHeuristic) -> Self {
      self.decoder = self.decoder.with_heuristic(heuristic);
      self
   }

   pub fn handle_event(&self, event: &RawEvent) -> Outcome {
      self.counters.seen.fetch_add(1, Ordering::Relaxed);

      let Some(frame) = self.filter.select(&event.manufacturer_data) else {
         self.counters.ignored.fetch_add(1, Ordering::Relaxed);
         return Outcome::Ignored;
      };
      self.counters.accepted.fetch_add(1, Ordering::Relaxed);
      debug!("Status frame from {}: {}", event.address, hex::encode(frame));

      let status = match self.decoder.decode(frame) {
         Ok(status) => status,
         Err(e) => {
            warn!("Dropping frame from {}: {e}", event.address);
            self.counters.malformed.fetch_add(1, Ordering::Relaxed);
            return Outcome::Malformed(e);
         },
      };

      let delivery = self.events.publish(&status);
      self.counters.published.fetch_add(1, Ordering::Relaxed);
      if delivery.failed > 0 {
         self
            .counters
            .subscriber_failures
            .fetch_add(delivery.failed, Ordering::Relaxed);
      }
      Outcome::Published
   }

   /// Drives one scanning session until the host ends it.
   ///
   /// Never returns normally: `ScanSessionEnded` when the stream finishes,
   /// the start error if the session could not be opened.
   pub async fn run<S: ScanSource>(
      &self,
      source: &S,
      config: &ScanConfig,
   ) -> Result<Infallible> {
      let mut events = source.start_session(config).await?;
      info!("Scan session started");

      while let Some(event) = events.next().await {
         self.handle_event(&event);
      }

      info!("Scan session ended - {:?}", self.stats());
      Err(ScanError::ScanSessionEnded)
   }

   pub fn stats(&self) -> ScanStats {
      ScanStats {
         seen: self.counters.seen.load(Ordering::Relaxed),
         accepted: self.counters.accepted.load(Ordering::Relaxed),
         ignored: self.counters.ignored.load(Ordering::Relaxed),
         malformed: self.counters.malformed.load(Ordering::Relaxed),
         published: self.counters.published.load(Ordering::Relaxed),
         subscriber_failures: self.counters.subscriber_failures.load(Ordering::Relaxed),
      }
   }
}

#[cfg(test)]
mod tests {
   use std::collections::HashMap;

   use bluer::Address;
   use futures::stream;
   use parking_lot::Mutex;

   use super::*;
   use crate::{
      airpods::protocol::{APPLE_CID, DecodedStatus, PodStatus},
      bluetooth::scan::{Frame, RawEventStream},
      event::{EventBus, EventHub, Subscriber},
   };

   const TEST_ADDRESS: Address = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

   struct SimulatedScan {
      events: Vec<RawEvent>,
   }

   impl ScanSource for SimulatedScan {
      async fn start_session(&self, _config: &ScanConfig) -> Result<RawEventStream> {
         Ok(stream::iter(self.events.clone()).boxed())
      }
   }

   struct BlockedScan;

   impl ScanSource for BlockedScan {
      async fn start_session(&self, _config: &ScanConfig) -> Result<RawEventStream> {
         Err(ScanError::AdapterNotFound("hci0".into()))
      }
   }

   fn event(entries: &[(u16, &[u8])]) -> RawEvent {
      RawEvent {
         address: TEST_ADDRESS,
         manufacturer_data: entries
            .iter()
            .map(|&(cid, data)| (cid, Frame::from_slice(data)))
            .collect::<HashMap<_, _>>(),
      }
   }

   fn status_frame() -> Vec<u8> {
      let mut data = vec![0u8; 25];
      data[0] = 0x07;
      data[1] = 0x19;
      data[3] = 0x0E;
      data[4] = 0x20;
      data[5] = 0b0010_0011;
      data[12] = 0x32;
      data[13] = 0x9F;
      data
   }

   fn collecting_hub() -> (Arc<EventHub>, Arc<Mutex<Vec<DecodedStatus>>>) {
      let hub = EventHub::new();
      let seen = Arc::new(Mutex::new(Vec::new()));
      let sink = seen.clone();
      let subscriber: Subscriber = Arc::new(move |s: &DecodedStatus| sink.lock().push(s.clone()));
      hub.subscribe(subscriber);
      (hub, seen)
   }

   fn scanner(hub: Arc<EventHub>) -> BatteryScanner {
      BatteryScanner::new(Arc::new(DeviceRegistry::builtin()), hub)
   }

   #[test]
   fn test_end_to_end_frame() {
      let (hub, seen) = collecting_hub();
      let scanner = scanner(hub);

      let frame = status_frame();
      let outcome = scanner.handle_event(&event(&[(0x0006, &[0x01, 0x02][..]), (APPLE_CID, &frame[..])]));
      assert_eq!(outcome, Outcome::Published);

      let seen = seen.lock();
      assert_eq!(seen.len(), 1);
      let status = &seen[0];
      assert_eq!(status.device.name, "AirPods Pro");
      assert!(status.device.connected);
      assert_eq!(
         status.left,
         Some(PodStatus {
            charging: false,
            battery: 50
         })
      );
      assert_eq!(
         status.right,
         Some(PodStatus {
            charging: true,
            battery: 31
         })
      );
      assert_eq!(status.to_json()["case"], serde_json::json!({ "lidOpen": true }));
   }

   #[test]
   fn test_unrelated_frames_are_not_published() {
      let (hub, seen) = collecting_hub();
      let scanner = scanner(hub);

      let mut handoff = status_frame();
      handoff[0] = 0x0c;
      assert_eq!(scanner.handle_event(&event(&[(APPLE_CID, &handoff[..])])), Outcome::Ignored);
      assert_eq!(scanner.handle_event(&event(&[(0x0075, &status_frame()[..])])), Outcome::Ignored);
      assert_eq!(scanner.handle_event(&event(&[])), Outcome::Ignored);

      assert!(seen.lock().is_empty());
      let stats = scanner.stats();
      assert_eq!(stats.seen, 3);
      assert_eq!(stats.accepted, 0);
      assert_eq!(stats.ignored, 3);
      assert_eq!(stats.published, 0);
   }

   #[test]
   fn test_malformed_frame_does_not_stop_stream() {
      let (hub, seen) = collecting_hub();
      let scanner = scanner(hub);

      let frame = status_frame();
      let outcome = scanner.handle_event(&event(&[(APPLE_CID, &frame[..10])]));
      assert_eq!(
         outcome,
         Outcome::Malformed(ProtoError::MalformedFrame {
            expected: 23,
            actual: 10
         })
      );
      assert_eq!(scanner.handle_event(&event(&[(APPLE_CID, &frame[..])])), Outcome::Published);

      assert_eq!(seen.lock().len(), 1);
      assert_eq!(scanner.stats().accepted, 2);
      assert_eq!(scanner.stats().malformed, 1);
   }

   #[test]
   fn test_subscriber_failures_are_counted() {
      let (hub, seen) = collecting_hub();
      hub.subscribe(Arc::new(|s: &DecodedStatus| {
         if s.device.connected {
            panic!("subscriber failure");
         }
      }));
      let scanner = scanner(hub.clone());

      assert_eq!(
         scanner.handle_event(&event(&[(APPLE_CID, &status_frame()[..])])),
         Outcome::Published
      );
      let first = seen.lock()[0].clone();
      assert_eq!(scanner.stats().subscriber_failures, 1);
      assert_eq!(hub.publish(&first).failed, 1);
      assert_eq!(seen.lock().len(), 2);
   }

   #[tokio::test]
   async fn test_run_simulated_session() {
      let (hub, seen) = collecting_hub();
      let scanner = scanner(hub);

      let frame = status_frame();
      let mut low_res = status_frame();
      low_res[6] = 0x85;
      low_res[21] = 0x11;
      let source = SimulatedScan {
         events: vec![
            event(&[(APPLE_CID, &frame[..])]),
            event(&[(APPLE_CID, &[0x10, 0x05, 0x00][..])]),
            event(&[(APPLE_CID, &frame[..20])]),
            event(&[(APPLE_CID, &low_res[..])]),
         ],
      };

      let Err(err) = scanner.run(&source, &ScanConfig::default()).await;
      assert!(matches!(err, ScanError::ScanSessionEnded));

      let seen = seen.lock();
      assert_eq!(seen.len(), 2);
      assert!(seen[0].device.decrypted);
      assert!(!seen[1].device.decrypted);
      assert_eq!(seen[1].left.map(|p| p.battery), Some(80));
      assert_eq!(seen[1].right.map(|p| p.battery), Some(50));

      assert_eq!(
         scanner.stats(),
         ScanStats {
            seen: 4,
            accepted: 3,
            ignored: 1,
            malformed: 1,
            published: 2,
            subscriber_failures: 0,
         }
      );
   }

   #[tokio::test]
   async fn test_start_failure_is_propagated() {
      let (hub, seen) = collecting_hub();
      let scanner = scanner(hub);

      let result = scanner.run(&BlockedScan, &ScanConfig::default()).await;
      assert!(matches!(result, Err(ScanError::AdapterNotFound(_))));
      assert!(seen.lock().is_empty());
      assert_eq!(scanner.stats(), ScanStats::default());
   }
}
