//! `AirPods` battery scanner daemon.
//!
//! Listens for proximity-pairing advertisements and logs every decoded
//! battery and case status as a JSON line.

use std::{sync::Arc, time::Duration};

use log::{error, info, warn};
use rand::Rng;
use tokio::{select, signal, time};

use podscan::{
   BatteryScanner, BluerScanSource, DecodedStatus, EventHub, Result, ScanError, config::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   info!("Starting podscan...");

   // Load configuration
   let config = Config::load()?;
   let registry = Arc::new(config.registry());
   info!("Loaded configuration with {} known models", registry.len());

   let hub = EventHub::new();
   hub.subscribe(Arc::new(|status: &DecodedStatus| {
      info!("{}", status.to_json());
   }));

   let scanner = BatteryScanner::new(registry, hub).with_heuristic(config.resolution);
   let source = BluerScanSource::new().await?;

   select! {
      res = scan_loop(&scanner, &source, &config) => res?,
      res = signal::ctrl_c() => {
         res?;
         info!("Shutting down podscan...");
      },
   }

   if let Ok(stats) = serde_json::to_string(&scanner.stats()) {
      info!("Scan statistics: {stats}");
   }
   Ok(())
}

/// Keeps a session running, restarting it after it ends or fails to start.
async fn scan_loop(
   scanner: &BatteryScanner,
   source: &BluerScanSource,
   config: &Config,
) -> Result<()> {
   let scan_config = config.scan_config();
   let mut failures = 0u32;

   loop {
      match scanner.run(source, &scan_config).await {
         Err(ScanError::ScanSessionEnded) => {
            warn!("Scan session ended, restarting");
            failures = 0;
         },
         Err(e) => {
            failures += 1;
            error!("Failed to scan ({failures}/{}): {e}", config.retry_count);
            if failures >= config.retry_count {
               return Err(e);
            }
         },
      }

      let delay = calc_retry_delay(failures, config.retry_delay(), config.max_retry_delay());
      info!("Restarting scan in {delay:?}");
      time::sleep(delay).await;
   }
}

fn calc_retry_delay(retry_count: u32, base_delay: Duration, max_delay: Duration) -> Duration {
   let exponential = base_delay * (1 << retry_count.min(4));
   let delay = exponential.min(max_delay);
   let jitter = rand::thread_rng().gen_range(0..1000);
   delay + Duration::from_millis(jitter)
}
