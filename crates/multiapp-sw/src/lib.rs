//! # MultiApp Offline Cache
//!
//! The offline cache manager behind the multiapp launcher. It mediates every
//! request issued by the pages it controls, keeps one named cache generation
//! per deployed version, and tells pages when a resource they already loaded
//! has a newer version on the network.
//!
//! ## Features
//!
//! - **Lifecycle**: install (precache), activate (purge old generations, claim pages)
//! - **Fetch strategies**: network-first for navigations, cache-first for
//!   sub-applications, stale-while-revalidate for same-origin assets,
//!   network-first for cross-origin requests
//! - **Update notices**: `UPDATE_AVAILABLE` messages on ETag / Last-Modified mismatch
//! - **Control channel**: `SKIP_WAITING` and `PREFETCH` messages from pages
//! - **Lifetime tracking**: every handler registers its async work with the event
//!
//! ## Architecture
//!
//! ```text
//! Registration
//!     ├── installing (CacheManager)
//!     ├── waiting    (CacheManager)
//!     └── active     (CacheManager) ──► Router ──► strategy
//!                                          │
//!                        CacheStorage ◄────┴────► Fetch (network)
//!                            └── generation
//!                                    └── CacheKey → CacheEntry
//!
//! Clients ◄── UPDATE_AVAILABLE / CONTROLLER_CHANGE
//! ```

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod freshness;
pub mod lifetime;
pub mod manager;
pub mod message;
pub mod registration;
pub mod router;
pub mod state;
mod strategy;

pub use cache::{CacheEntry, CacheKey, CacheStorage, MemoryCacheStorage, StorageSnapshot};
pub use clients::{ClientId, ClientInfo, ClientMatchOptions, Clients};
pub use freshness::Validators;
pub use lifetime::{ExtendableEvent, WorkHandle};
pub use manager::{
    ActivateReport, CacheManager, FetchDisposition, FetchResponse, InstallReport, ManagerConfig,
    ResponseSource,
};
pub use message::{ClientMessage, ControlMessage};
pub use registration::Registration;
pub use router::{RequestClass, Router, Strategy};
pub use state::{WorkerId, WorkerState};

// ==================== Errors ====================

/// Errors raised by the cache store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),

    #[error("Cache quota exceeded")]
    QuotaExceeded,

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

/// Errors that can occur in cache manager operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] multiapp_net::NetError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Work aborted: {0}")]
    Aborted(String),
}
