//! flowsieve is a packet preprocessing engine for extracting fixed-shape
//! feature records from live network traffic.
//!
//! A per-queue [classifier](classifier) parses L2–L4, keeps counters, and
//! samples selected frames into a single-owner frame ring. One drainer worker
//! per queue peeks batches from the ring, computes an enriched
//! [`FeatureRecord`], and hands it to a user-supplied analysis callback. The
//! engine is best-effort under overload: parse failures and ring pressure are
//! counted, never raised.
//!
//! ## Example
//! ```no_run
//! use flowsieve_core::config::EngineConfig;
//! use flowsieve_core::subscription::FeatureRecord;
//! use flowsieve_core::Engine;
//!
//! let mut config = EngineConfig::default();
//! config.interface = "eth0".to_string();
//!
//! let callback = |record: &FeatureRecord| {
//!     println!("{}", record);
//!     0
//! };
//! let mut engine = Engine::new(config, callback).unwrap();
//! engine.start().unwrap();
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! engine.stop();
//! println!("{}", engine.stats());
//! ```

pub mod capture;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod maps;
pub mod policy;
pub mod protocols;
pub mod stats;
pub mod subscription;

mod drainer;
mod flowtable;
mod memory;
mod port;
mod runtime;
mod timing;

#[cfg(test)]
pub(crate) mod testutil;

pub use classifier::Verdict;
pub use config::{load_config, Config, EngineConfig};
pub use errors::Error;
pub use runtime::Engine;
pub use stats::{Stat, StatsSnapshot};
pub use subscription::{AnalysisCallback, FeatureRecord};
