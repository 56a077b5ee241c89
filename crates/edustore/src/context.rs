// Application context shared by every request handler.

use std::sync::Arc;

use edustore_core::db::adapter::Adapter;
use edustore_core::options::EduStoreOptions;

use crate::middleware::RateLimiter;
use crate::notify::{ChannelNotifier, OtpNotifier};
use crate::store::{AdapterStore, Store};

/// Built once at startup and handed to handlers as `Arc<AppContext>`.
pub struct AppContext {
    pub options: EduStoreOptions,

    /// Typed repository over the configured storage adapter.
    pub store: Arc<dyn Store>,

    pub notifier: Arc<dyn OtpNotifier>,

    pub rate_limiter: Arc<RateLimiter>,
}

// Manual Debug impl because the trait objects are not Debug
impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("options", &self.options)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Context over `adapter` with the logging notifier.
    pub fn new(options: EduStoreOptions, adapter: Arc<dyn Adapter>) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(options.rate_limit.clone()));
        Self {
            options,
            store: Arc::new(AdapterStore::new(adapter)),
            notifier: Arc::new(ChannelNotifier::logging()),
            rate_limiter,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OtpNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = store;
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Arc::new(rate_limiter);
        self
    }
}
