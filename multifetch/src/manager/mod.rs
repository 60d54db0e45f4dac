//! The download manager.
//!
//! [`DownloadManager`] ties the scheduling primitives together:
//!
//! ```text
//! queue_request(key)
//!   ├─ cache hit ─────────────► deliver immediately (from_cache = true)
//!   ├─ fetch in flight ───────► attach waiter
//!   └─ otherwise ─────────────► queue ─► pump ─► transport task
//!                                                   │
//!        progress events ◄── record_progress ◄──────┤
//!        cache + deliver ◄── complete ◄─────────────┘
//! ```
//!
//! Every step runs under one lock, so a resource is fetched at most once at a
//! time and the number of running transports never exceeds the limit.

mod downloader;
mod handle;
mod shared;
mod status;

pub use downloader::DownloadManager;
pub use handle::{Admission, DownloadHandle, FetchedImage, ImageHandle};
pub use status::ManagerStatus;
