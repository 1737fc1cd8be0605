//! API facade module
//!
//! `CoverExtractor` ties a transport, the tag reader and the cover cache together.
//! Extraction is best-effort: `extract_cover` never fails, it just returns `None`.
//! `try_extract_cover` runs the same pipeline but keeps the reason.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::runtime::{self, Runtime};

use crate::cache::CoverCache;
use crate::formats::{find_cover, ExtractedCover, FormatError};
use crate::transport::{AutoTransport, Transport, TransportError};

/// Why a cover could not be produced.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
    #[error("Fetched {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Builder configuration for CoverExtractor.
#[derive(Debug, Clone)]
pub struct CoverExtractorBuilder {
    timeout_seconds: Option<u64>, // Default: none, Range: 1-300
    cache_capacity: usize,        // Default: 64, Range: 0-4096, 0 disables
    max_fetch_bytes: Option<usize>, // Default: none, Range: 1 KiB-1 GiB
    runtime_threads: usize,       // Default: 2, Range: 1-64 (blocking only)
}

impl Default for CoverExtractorBuilder {
    fn default() -> Self {
        Self {
            timeout_seconds: None,
            cache_capacity: 64,
            max_fetch_bytes: None,
            runtime_threads: 2,
        }
    }
}

impl CoverExtractorBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(secs.clamp(1, 300));
        self
    }
    pub fn cache_capacity(mut self, cap: usize) -> Self {
        self.cache_capacity = cap.min(4096);
        self
    }
    pub fn max_fetch_bytes(mut self, bytes: usize) -> Self {
        self.max_fetch_bytes = Some(bytes.clamp(1024, 1024 * 1024 * 1024));
        self
    }
    pub fn runtime_threads(mut self, threads: usize) -> Self {
        self.runtime_threads = threads.clamp(1, 64);
        self
    }

    /// Build an extractor that reads URLs over HTTP and everything else from disk.
    pub fn build(self) -> CoverExtractor {
        self.build_with_transport(AutoTransport::new())
    }

    pub fn build_with_transport<T: Transport + 'static>(self, transport: T) -> CoverExtractor {
        CoverExtractor {
            transport: Arc::new(transport),
            cache: (self.cache_capacity > 0).then(|| CoverCache::new(self.cache_capacity)),
            timeout: self.timeout_seconds.map(Duration::from_secs),
            max_fetch_bytes: self.max_fetch_bytes,
        }
    }

    fn blocking_runtime(&self) -> Result<Runtime, std::io::Error> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(self.runtime_threads)
            .thread_name("coverart-worker")
            .enable_all()
            .build()?;
        tracing::debug!(worker_threads = self.runtime_threads, "blocking runtime started");
        Ok(runtime)
    }

    /// Build an extractor with its own runtime for non-async callers.
    pub fn build_blocking(self) -> Result<BlockingCoverExtractor, std::io::Error> {
        let runtime = self.blocking_runtime()?;
        Ok(BlockingCoverExtractor {
            inner: self.build(),
            runtime,
        })
    }

    pub fn build_blocking_with_transport<T: Transport + 'static>(
        self,
        transport: T,
    ) -> Result<BlockingCoverExtractor, std::io::Error> {
        let runtime = self.blocking_runtime()?;
        Ok(BlockingCoverExtractor {
            inner: self.build_with_transport(transport),
            runtime,
        })
    }
}

/// Fetches audio files and pulls their embedded cover art.
///
/// Cheap to clone; clones share the transport and the cache. Calls are
/// independent of each other and may run concurrently.
#[derive(Clone)]
pub struct CoverExtractor {
    transport: Arc<dyn Transport>,
    cache: Option<CoverCache>,
    timeout: Option<Duration>,
    max_fetch_bytes: Option<usize>,
}

impl Default for CoverExtractor {
    fn default() -> Self {
        CoverExtractorBuilder::default().build()
    }
}

impl CoverExtractor {
    pub fn builder() -> CoverExtractorBuilder {
        CoverExtractorBuilder::new()
    }

    pub fn cache(&self) -> Option<&CoverCache> {
        self.cache.as_ref()
    }

    async fn fetch(&self, locator: &str) -> Result<bytes::Bytes, TransportError> {
        let fetch = self.transport.fetch(locator);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fetch)
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => fetch.await,
        }
    }

    /// Fetch `locator` and return its first embedded picture.
    ///
    /// `Ok(None)` covers both "no ID3 tag" and "tag without a picture".
    pub async fn try_extract_cover(&self, locator: &str) -> Result<Option<ExtractedCover>, ExtractError> {
        if let Some(cover) = self.cache.as_ref().and_then(|c| c.get(locator)) {
            tracing::trace!(locator, "cover cache hit");
            return Ok(Some(cover));
        }

        let data = self.fetch(locator).await?;
        if let Some(limit) = self.max_fetch_bytes.filter(|&limit| data.len() > limit) {
            return Err(ExtractError::TooLarge {
                size: data.len(),
                limit,
            });
        }

        // Copying the image out lets the file buffer drop as soon as we return.
        let cover = find_cover(&data)?;
        if let (Some(cache), Some(cover)) = (&self.cache, &cover) {
            cache.insert(locator, cover.clone());
        }
        Ok(cover)
    }

    /// Best-effort variant of [`try_extract_cover`](Self::try_extract_cover).
    pub async fn extract_cover(&self, locator: &str) -> Option<ExtractedCover> {
        match self.try_extract_cover(locator).await {
            Ok(cover) => {
                if cover.is_none() {
                    tracing::debug!(locator, "no embedded cover");
                }
                cover
            }
            Err(ExtractError::Format(e)) => {
                tracing::debug!(locator, error = %e, "unreadable tag");
                None
            }
            Err(e) => {
                tracing::warn!(locator, error = %e, "cover extraction failed");
                None
            }
        }
    }

    /// Extract several covers concurrently. Results keep the input order.
    pub async fn extract_many<S: AsRef<str>>(&self, locators: &[S]) -> Vec<Option<ExtractedCover>> {
        join_all(locators.iter().map(|l| self.extract_cover(l.as_ref()))).await
    }
}

/// Synchronous wrapper that owns a multi-thread runtime.
/// Its methods must not be called from inside another runtime.
pub struct BlockingCoverExtractor {
    inner: CoverExtractor,
    runtime: Runtime,
}

impl BlockingCoverExtractor {
    pub fn new() -> Result<Self, std::io::Error> {
        CoverExtractorBuilder::default().build_blocking()
    }

    pub fn extract_cover(&self, locator: &str) -> Option<ExtractedCover> {
        self.runtime.block_on(self.inner.extract_cover(locator))
    }

    pub fn try_extract_cover(&self, locator: &str) -> Result<Option<ExtractedCover>, ExtractError> {
        self.runtime.block_on(self.inner.try_extract_cover(locator))
    }

    pub fn extractor(&self) -> &CoverExtractor {
        &self.inner
    }
}
