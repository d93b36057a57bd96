//! Advertisement scanning sessions.
//!
//! This module defines the host scanning capability consumed by the
//! scanner and its `BlueZ` implementation.

use std::collections::HashMap;

use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, info, trace, warn};
use smallvec::SmallVec;
use smol_str::SmolStr;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, ScanError};

/// Raw manufacturer payload for one company identifier.
pub type Frame = SmallVec<[u8; 32]>;

/// Channel buffer size between the discovery task and the consumer
const CHANNEL_BUFFER_SIZE: usize = 256;

/// One observed advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
   pub address: Address,
   pub manufacturer_data: HashMap<u16, Frame>,
}

/// Stream of advertisements; ends when the host stops the session.
pub type RawEventStream = BoxStream<'static, RawEvent>;

/// Parameters for starting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
   /// Adapter to scan on, system default if `None`
   pub adapter: Option<SmolStr>,
   /// Deliver repeated advertisements from the same device
   pub duplicate_data: bool,
}

impl Default for ScanConfig {
   fn default() -> Self {
      Self {
         adapter: None,
         duplicate_data: true,
      }
   }
}

/// Host capability that delivers advertisements.
pub trait ScanSource: Send + Sync {
   /// Starts continuous delivery of advertisements.
   ///
   /// Failing to start (no adapter, not authorised) is reported here, not
   /// retried.
   fn start_session(
      &self,
      config: &ScanConfig,
   ) -> impl Future<Output = Result<RawEventStream>> + Send;
}

/// Scanning through `BlueZ`.
pub struct BluerScanSource {
   session: Session,
}

impl BluerScanSource {
   pub async fn new() -> Result<Self> {
      Ok(Self {
         session: Session::new().await?,
      })
   }

   async fn open_adapter(&self, name: Option<&str>) -> Result<Adapter> {
      let adapter = match name {
         Some(name) => self
            .session
            .adapter(name)
            .map_err(|_| ScanError::AdapterNotFound(name.to_string()))?,
         None => self.session.default_adapter().await?,
      };

      if !adapter.is_powered().await? {
         adapter.set_powered(true).await?;
         info!("Powered on adapter: {}", adapter.name());
      }
      Ok(adapter)
   }
}

impl ScanSource for BluerScanSource {
   async fn start_session(&self, config: &ScanConfig) -> Result<RawEventStream> {
      let adapter = self.open_adapter(config.adapter.as_deref()).await?;

      let mut filter = DiscoveryFilter::default();
      filter.transport = DiscoveryTransport::Le;
      filter.duplicate_data = config.duplicate_data;
      adapter.set_discovery_filter(filter).await?;

      let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      let (ready_tx, ready_rx) = oneshot::channel();
      tokio::spawn(run_discovery(adapter, tx, ready_tx));

      ready_rx.await.map_err(|_| ScanError::ScanSessionEnded)??;

      Ok(stream::unfold(rx, |mut rx| async move {
         let event = rx.recv().await?;
         Some((event, rx))
      })
      .boxed())
   }
}

async fn run_discovery(
   adapter: Adapter,
   tx: mpsc::Sender<RawEvent>,
   ready: oneshot::Sender<Result<()>>,
) {
   let events = match adapter.discover_devices_with_changes().await {
      Ok(events) => {
         let _ = ready.send(Ok(()));
         events
      },
      Err(e) => {
         let _ = ready.send(Err(e.into()));
         return;
      },
   };
   info!("Discovery started on {}", adapter.name());

   let mut events = std::pin::pin!(events);
   while let Some(event) = events.next().await {
      let AdapterEvent::DeviceAdded(addr) = event else {
         continue;
      };
      let Some(raw) = read_advertisement(&adapter, addr).await else {
         continue;
      };
      if tx.send(raw).await.is_err() {
         debug!("Scan consumer gone, stopping discovery on {}", adapter.name());
         return;
      }
   }
   warn!("Discovery on {} ended", adapter.name());
}

async fn read_advertisement(adapter: &Adapter, addr: Address) -> Option<RawEvent> {
   let device = adapter.device(addr).ok()?;
   let rssi = match device.rssi().await {
      Ok(rssi) => rssi,
      Err(e) => {
         debug!("Failed to read RSSI of {addr}: {e}");
         return None;
      },
   };
   let data = match device.manufacturer_data().await {
      Ok(data) => data,
      Err(e) => {
         debug!("Failed to read manufacturer data of {addr}: {e}");
         return None;
      },
   };
   live_advertisement(addr, rssi, data)
}

/// Builds the event for a device that is currently advertising.
///
/// `BlueZ` reports cached devices without an RSSI; those are out of range
/// and their manufacturer data is stale.
fn live_advertisement(
   addr: Address,
   rssi: Option<i16>,
   data: Option<HashMap<u16, Vec<u8>>>,
) -> Option<RawEvent> {
   if rssi.is_none() {
      trace!("Skipping cached device {addr}, not in range");
      return None;
   }
   let data = data?;
   Some(RawEvent {
      address: addr,
      manufacturer_data: data
         .into_iter()
         .map(|(cid, bytes)| (cid, Frame::from_vec(bytes)))
         .collect(),
   })
}
