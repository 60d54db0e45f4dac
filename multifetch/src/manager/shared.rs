//! Process-wide shared manager.

use std::sync::{Arc, OnceLock};

use parking_lot::{const_mutex, Mutex};
use tokio::runtime::{Builder, Runtime};
use tracing::info;

use super::downloader::DownloadManager;
use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::transport::ReqwestTransport;

/// Worker threads of the runtime backing the shared manager.
const SHARED_RUNTIME_THREADS: usize = 2;

static SHARED: OnceLock<DownloadManager> = OnceLock::new();
static SHARED_RUNTIME: OnceLock<Runtime> = OnceLock::new();
static INIT: Mutex<()> = const_mutex(());

impl DownloadManager {
    /// Returns the process-wide manager, creating it on first use.
    ///
    /// The shared manager uses default configuration and runs its fetches on
    /// a dedicated background runtime, so it works from synchronous code too;
    /// use [`DownloadHandle::blocking_wait`](crate::DownloadHandle::blocking_wait)
    /// there. Concurrent first calls all receive the same instance.
    pub fn shared() -> Result<&'static DownloadManager, DownloadError> {
        if let Some(manager) = SHARED.get() {
            return Ok(manager);
        }

        let _guard = INIT.lock();
        if let Some(manager) = SHARED.get() {
            return Ok(manager);
        }

        let runtime = shared_runtime()?;
        let config = DownloaderConfig::default();
        let transport = ReqwestTransport::new()?;
        let manager =
            DownloadManager::with_runtime(config, Arc::new(transport), runtime.handle().clone());

        info!("Shared download manager initialised");
        Ok(SHARED.get_or_init(|| manager))
    }
}

/// Must be called with `INIT` held.
fn shared_runtime() -> Result<&'static Runtime, DownloadError> {
    if let Some(runtime) = SHARED_RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = Builder::new_multi_thread()
        .worker_threads(SHARED_RUNTIME_THREADS)
        .thread_name("multifetch-worker")
        .enable_all()
        .build()
        .map_err(|e| DownloadError::Runtime(format!("Failed to create Tokio runtime: {}", e)))?;

    Ok(SHARED_RUNTIME.get_or_init(|| runtime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_returns_same_instance() {
        let first = DownloadManager::shared().unwrap();
        let second = DownloadManager::shared().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_concurrent_first_use_yields_one_instance() {
        let addresses: Vec<usize> = (0..8)
            .map(|_| std::thread::spawn(|| DownloadManager::shared().unwrap() as *const _ as usize))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|t| t.join().unwrap())
            .collect();

        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_shared_has_default_config() {
        let manager = DownloadManager::shared().unwrap();
        assert_eq!(
            manager.config().maximum_number_of_threads,
            DownloaderConfig::default().maximum_number_of_threads
        );
    }
}
