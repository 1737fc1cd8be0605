// Transport abstraction module
// Fetches the full byte content behind a locator (URL or path). The tag reader
// only needs "a byte sequence or a failure", so every backend resolves to that.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not found")]
    NotFound,
    #[error("Timeout")]
    Timeout,
    #[error("Unexpected status: {0}")]
    Status(u16),
    #[error("Transport error: {0}")]
    Other(String),
}

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send>>;

pub trait Transport: Send + Sync {
    /// Fetches the whole resource behind `locator`.
    ///
    /// The future is boxed so transports can be stored as trait objects and
    /// shared between concurrent extraction calls.
    fn fetch(&self, locator: &str) -> FetchFuture;
}

/// HTTP(S) backend. Non-success statuses are reported as `Status`.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, locator: &str) -> FetchFuture {
        let client = self.client.clone();
        let url = locator.to_string();
        Box::pin(async move {
            let resp = client.get(&url).send().await.map_err(map_reqwest_error)?;
            let status = resp.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(TransportError::NotFound);
            }
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            resp.bytes().await.map_err(map_reqwest_error)
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Local filesystem backend.
#[derive(Clone, Copy, Default)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn fetch(&self, locator: &str) -> FetchFuture {
        let path = locator.strip_prefix("file://").unwrap_or(locator).to_string();
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TransportError::NotFound),
                Err(e) => Err(TransportError::Other(e.to_string())),
            }
        })
    }
}

/// Picks HTTP for `http://` and `https://` locators, the filesystem otherwise.
#[derive(Clone, Default)]
pub struct AutoTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl AutoTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn is_remote(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl Transport for AutoTransport {
    fn fetch(&self, locator: &str) -> FetchFuture {
        if is_remote(locator) {
            self.http.fetch(locator)
        } else {
            self.file.fetch(locator)
        }
    }
}

/// In-memory backend keyed by locator. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    entries: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: impl Into<String>, data: impl Into<Bytes>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(locator.into(), data.into());
    }

    pub fn remove(&self, locator: &str) -> Option<Bytes> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(locator)
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, locator: &str) -> FetchFuture {
        let found = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(locator)
            .cloned();
        Box::pin(async move {
            match found {
                Some(data) => Ok(data),
                None => Err(TransportError::NotFound),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn memory_transport_returns_inserted_bytes() {
        let transport = MemoryTransport::new();
        transport.insert("song.mp3", vec![1u8, 2, 3]);
        let data = transport.fetch("song.mp3").await.unwrap();
        assert_eq!(&data[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn memory_transport_survives_poisoned_lock() {
        let transport = MemoryTransport::new();
        let shared = transport.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(transport.entries.is_poisoned());

        transport.insert("song.mp3", vec![4u8, 5]);
        assert_eq!(&transport.fetch("song.mp3").await.unwrap()[..], &[4, 5]);
        assert!(transport.remove("song.mp3").is_some());
    }

    #[tokio::test]
    async fn memory_transport_missing_is_not_found() {
        let transport = MemoryTransport::new();
        let err = transport.fetch("nope.mp3").await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound));
    }

    #[tokio::test]
    async fn file_transport_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ID3 payload").unwrap();
        file.flush().unwrap();

        let data = FileTransport.fetch(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(&data[..], b"ID3 payload");
    }

    #[tokio::test]
    async fn file_transport_strips_file_scheme() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        let locator = format!("file://{}", file.path().display());
        let data = FileTransport.fetch(&locator).await.unwrap();
        assert_eq!(&data[..], b"abc");
    }

    #[tokio::test]
    async fn file_transport_missing_file() {
        let err = FileTransport.fetch("/definitely/not/here.mp3").await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound));
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://cdn.example.com/a.mp3"));
        assert!(is_remote("HTTP://example.com/a.mp3"));
        assert!(!is_remote("assets/music/a.mp3"));
        assert!(!is_remote("file:///tmp/a.mp3"));
    }
}
