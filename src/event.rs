//! Event handling system for decoded status updates.
//!
//! This module provides the subscriber registry that fans every decoded
//! status out to interested observers.

use std::{
   panic::{self, AssertUnwindSafe},
   sync::Arc,
};

use log::warn;
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::airpods::protocol::DecodedStatus;

/// Callback invoked with every decoded status.
///
/// Identity is the allocation: unsubscribing requires a clone of the same
/// `Arc` that was subscribed.
pub type Subscriber = Arc<dyn Fn(&DecodedStatus) + Send + Sync>;

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
   pub delivered: u64,
   pub failed: u64,
}

/// Trait for implementing status fan-out.
pub trait EventBus: Send + Sync {
   /// Delivers `status` to every registered listener.
   fn publish(&self, status: &DecodedStatus) -> Delivery;
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventBus>;

/// Ordered subscriber registry.
///
/// Subscribers run synchronously on the publishing thread, in subscription
/// order. The list is snapshotted before fan-out, so a callback may
/// subscribe or unsubscribe without affecting the publish in progress.
#[derive(Default)]
pub struct EventHub {
   subscribers: Mutex<Vec<Subscriber>>,
}

impl EventHub {
   pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
   }

   pub fn subscribe(&self, callback: Subscriber) {
      self.subscribers.lock().push(callback);
   }

   /// Removes the first entry sharing `callback`'s allocation.
   ///
   /// Returns whether an entry was removed.
   pub fn unsubscribe(&self, callback: &Subscriber) -> bool {
      let mut subscribers = self.subscribers.lock();
      let Some(i) = subscribers.iter().position(|s| Arc::ptr_eq(s, callback)) else {
         return false;
      };
      subscribers.remove(i);
      true
   }

   pub fn len(&self) -> usize {
      self.subscribers.lock().len()
   }

   pub fn is_empty(&self) -> bool {
      self.subscribers.lock().is_empty()
   }

   fn snapshot(&self) -> SmallVec<[Subscriber; 4]> {
      self.subscribers.lock().iter().cloned().collect()
   }
}

impl EventBus for EventHub {
   /// A panicking subscriber is logged and counted; the remaining
   /// subscribers still receive the status.
   fn publish(&self, status: &DecodedStatus) -> Delivery {
      let mut delivery = Delivery::default();
      for (i, callback) in self.snapshot().iter().enumerate() {
         match panic::catch_unwind(AssertUnwindSafe(|| callback(status))) {
            Ok(()) => delivery.delivered += 1,
            Err(_) => {
               warn!("Subscriber {i} panicked while handling status for {}", status.device.name);
               delivery.failed += 1;
            },
         }
      }
      delivery
   }
}
