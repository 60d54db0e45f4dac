//! Multifetch - concurrent download manager
//!
//! This library fetches resources over HTTP through a bounded pool of
//! concurrent transports, caches the bytes in an LRU-by-size cache, and
//! coalesces duplicate in-flight requests so each resource is fetched at most
//! once at a time.
//!
//! # Architecture
//!
//! ```text
//! queue_request ──► Cache ──► Hit ──► deliver immediately
//!                     │ Miss
//!                     ▼
//!              InFlightRegistry ──► Coalesced ──► wait on existing fetch
//!                     │ New
//!                     ▼
//!               RequestQueue (FIFO) ──► WorkerPool slot ──► Transport
//!                                                             │
//!                   Cache.put ◄── fan out to every waiter ◄───┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use multifetch::{DownloadManager, DownloaderConfig};
//!
//! let manager = DownloadManager::new(DownloaderConfig::default())?;
//! let mut events = manager.subscribe();
//!
//! let handle = manager.queue_request("https://example.com/logo.png");
//! if let Some(bytes) = handle.await {
//!     println!("fetched {} bytes", bytes.len());
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod image;
pub mod key;
pub mod logging;
pub mod manager;
pub mod scheduler;
pub mod transport;

pub use cache::{ByteLruCache, CacheStats, PutOutcome};
pub use config::{ConfigError, ConfigFile, DownloaderConfig};
pub use error::DownloadError;
pub use events::{DownloadEvent, EventBus, EventReceiver};
pub use key::ResourceKey;
pub use manager::{
    Admission, DownloadHandle, DownloadManager, FetchedImage, ImageHandle, ManagerStatus,
};
pub use transport::{FetchRequest, ProgressSink, ReqwestTransport, Transport, TransportError};
