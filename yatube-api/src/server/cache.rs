//! Whole-page cache for rendered listings.
//!
//! Entries are served until their time-to-live runs out or the cache is
//! cleared; a page rendered within that window may be stale.

use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_ENTRIES: u64 = 10_000;

#[async_trait]
pub trait PageCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn insert(&self, key: String, page: String);

    /// Drops every entry. Subsequent reads see the change immediately.
    fn clear(&self);
}

#[derive(Clone, Debug)]
pub struct MokaPageCache {
    pages: Cache<String, String>,
}

impl MokaPageCache {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let pages = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .time_to_live(timeout)
            .build();

        debug!(?timeout, "Initialized page cache");
        Self { pages }
    }
}

impl Default for MokaPageCache {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl PageCache for MokaPageCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.pages.get(key).await
    }

    async fn insert(&self, key: String, page: String) {
        self.pages.insert(key, page).await;
    }

    fn clear(&self) {
        self.pages.invalidate_all();
        info!("Page cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use crate::server::cache::{MokaPageCache, PageCache};
    use std::time::Duration;

    #[tokio::test]
    async fn clear_is_immediately_visible() {
        let cache = MokaPageCache::default();
        cache.insert("index_page:/:anonymous".to_owned(), "old".to_owned()).await;
        assert_eq!(
            cache.get("index_page:/:anonymous").await.as_deref(),
            Some("old")
        );

        cache.clear();
        assert_eq!(cache.get("index_page:/:anonymous").await, None);
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = MokaPageCache::new(Duration::from_millis(50));
        cache.insert("key".to_owned(), "page".to_owned()).await;
        assert!(cache.get("key").await.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(cache.get("key").await.is_none());
    }
}
