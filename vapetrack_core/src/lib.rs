#![forbid(unsafe_code)]

//! Core domain model and business logic for VapeTrack.
//!
//! This crate provides:
//! - Domain types (profile, puff events, juice purchases, rewards)
//! - The owned event/profile store and its persistence
//! - Derived metrics and the XP/reward ledger
//! - Best-effort remote sync
//! - Health timeline, display tickers and analytics

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod kv;
pub mod catalog;
pub mod metrics;
pub mod ledger;
pub mod health;
pub mod analytics;
pub mod remote;
pub mod sync;
pub mod ticker;
pub mod store;

// Re-export commonly used types
pub use error::{AuthError, Error, Result};
pub use types::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use remote::{MemoryBackend, RemoteBackend, RestBackend};
pub use sync::SyncGateway;
pub use store::{LogOutcome, Store};
