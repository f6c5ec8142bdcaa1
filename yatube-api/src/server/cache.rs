use crate::server::{Result, ServerError};
use axum::body::Bytes;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

pub const INDEX_CACHE_CAPACITY: u64 = 1_000;

/// Rendered home pages, keyed by request path and query.
///
/// Entries live for a fixed time and are never invalidated by writes, so new posts show up on the
/// home page only once the entry expires or the cache is cleared.
#[derive(Clone, Debug)]
pub struct IndexCache {
    pages: Cache<String, Bytes>,
}

impl IndexCache {
    #[must_use]
    pub fn new(time_to_live: Duration) -> Self {
        let pages = Cache::builder()
            .max_capacity(INDEX_CACHE_CAPACITY)
            .time_to_live(time_to_live)
            .build();

        Self { pages }
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.pages.get(key).await
    }

    pub async fn insert(&self, key: String, page: Bytes) {
        self.pages.insert(key, page).await;
    }

    /// Returns the cached page for `key`, rendering and storing it on a miss.
    ///
    /// Concurrent misses on the same key wait for a single render.
    pub async fn get_or_render<F>(&self, key: String, render: F) -> Result<Bytes>
    where
        F: Future<Output = Result<Bytes>>,
    {
        let entry = self
            .pages
            .entry(key)
            .or_try_insert_with(render)
            .await
            .map_err(ServerError::Shared)?;

        if !entry.is_fresh() {
            debug!(key = %entry.key(), "Serving cached page");
        }

        Ok(entry.into_value())
    }

    pub fn clear(&self) {
        self.pages.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use crate::server::{ServerError, cache::IndexCache};
    use axum::{
        body::Bytes,
        http::{StatusCode, Uri},
    };
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn renders_once_until_cleared() {
        let cache = IndexCache::new(Duration::from_secs(60));

        let first = cache
            .get_or_render("/".to_owned(), async { Ok(Bytes::from_static(b"first")) })
            .await
            .unwrap();
        let second = cache
            .get_or_render("/".to_owned(), async { Ok(Bytes::from_static(b"second")) })
            .await
            .unwrap();
        assert_eq!(first, Bytes::from_static(b"first"));
        assert_eq!(second, Bytes::from_static(b"first"));

        cache.clear();
        let third = cache
            .get_or_render("/".to_owned(), async { Ok(Bytes::from_static(b"third")) })
            .await
            .unwrap();
        assert_eq!(third, Bytes::from_static(b"third"));
    }

    #[tokio::test]
    async fn concurrent_misses_render_once() {
        let cache = IndexCache::new(Duration::from_secs(60));
        let renders = &AtomicUsize::new(0);
        let render = move || async move {
            renders.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Bytes::from_static(b"page"))
        };

        let (first, second) = tokio::join!(
            cache.get_or_render("/".to_owned(), render()),
            cache.get_or_render("/".to_owned(), render()),
        );
        assert_eq!(first.unwrap(), Bytes::from_static(b"page"));
        assert_eq!(second.unwrap(), Bytes::from_static(b"page"));
        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_renders_are_not_cached() {
        let cache = IndexCache::new(Duration::from_secs(60));

        let failed = cache
            .get_or_render("/".to_owned(), async {
                Err(ServerError::UnknownRoute(Uri::from_static("/")))
            })
            .await;
        assert_eq!(failed.unwrap_err().status(), StatusCode::NOT_FOUND);

        let page = cache
            .get_or_render("/".to_owned(), async { Ok(Bytes::from_static(b"page")) })
            .await
            .unwrap();
        assert_eq!(page, Bytes::from_static(b"page"));
    }

    #[tokio::test]
    async fn keys_are_separate() {
        let cache = IndexCache::new(Duration::from_secs(60));

        cache.insert("/".to_owned(), Bytes::from_static(b"one")).await;
        assert_eq!(cache.get("/?page=2").await, None);
        assert_eq!(cache.get("/").await, Some(Bytes::from_static(b"one")));
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = IndexCache::new(Duration::from_millis(50));

        cache.insert("/".to_owned(), Bytes::from_static(b"one")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(cache.get("/").await, None);
    }
}
