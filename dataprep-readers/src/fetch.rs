//! Idempotent download of remote files to local paths

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::atomic::{copy_stream, write_atomically};
use crate::error::{Error, Result};

/// Source of response bodies
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Open `url` for reading. Unreachable hosts, timeouts and non-success
    /// statuses are errors here, before any byte is handed out.
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>>;
}

/// Options for the HTTP transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Whole-request timeout in seconds, body included
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            user_agent: concat!("dataprep/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchOptions {
    /// Timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Blocking HTTP(S) transport
#[cfg(feature = "http")]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    /// Build a client with the given options
    pub fn new(options: &FetchOptions) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout())
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| Error::InvalidArgument(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        let response = self.client.get(url).send().map_err(|e| Error::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Box::new(response))
    }
}

/// One file to make available locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Remote location
    pub url: String,

    /// Local destination
    pub dest: PathBuf,

    /// Size the finished file must have, when known
    pub expected_size: Option<u64>,
}

impl FetchRequest {
    /// Request `url` into `dest` without a size check
    pub fn new(url: &str, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.to_string(),
            dest: dest.into(),
            expected_size: None,
        }
    }

    /// Require the downloaded body to be exactly `bytes` long
    #[must_use]
    pub fn with_expected_size(mut self, bytes: u64) -> Self {
        self.expected_size = Some(bytes);
        self
    }
}

/// Downloads remote files unless a complete local copy already exists.
///
/// A file at the destination is assumed complete: bodies are written to a
/// `*.part` sibling and renamed only once the transfer has finished.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
}

impl Fetcher {
    /// Create a fetcher over any transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Create a fetcher using the blocking HTTP client
    #[cfg(feature = "http")]
    pub fn http(options: &FetchOptions) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(options)?)))
    }

    /// Make `url` available at `dest` and return `dest`
    pub fn ensure_local(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        self.fetch(&FetchRequest::new(url, dest))
    }

    /// Serve one request
    pub fn fetch(&self, request: &FetchRequest) -> Result<PathBuf> {
        let dest = &request.dest;
        if is_present(request)? {
            debug!(url = %request.url, dest = %dest.display(), "already present, skipping download");
            return Ok(dest.clone());
        }

        let started = Instant::now();
        let mut body = self.transport.open(&request.url)?;
        let bytes = write_atomically(dest, |writer, part| {
            let received = copy_stream(&mut body, writer, part, |e| Error::network(&request.url, e))?;
            match request.expected_size {
                Some(expected) if expected != received => Err(Error::network(
                    &request.url,
                    format!("expected {expected} bytes, received {received}"),
                )),
                _ => Ok(received),
            }
        })?;

        info!(
            url = %request.url,
            dest = %dest.display(),
            bytes,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "download complete"
        );
        Ok(dest.clone())
    }

    /// Serve requests one after another, stopping at the first failure
    pub fn fetch_all(&self, requests: &[FetchRequest]) -> Result<Vec<PathBuf>> {
        requests.iter().map(|request| self.fetch(request)).collect()
    }

    /// Serve requests concurrently; results keep the request order
    #[cfg(feature = "parallel")]
    pub fn fetch_all_parallel(&self, requests: &[FetchRequest]) -> Result<Vec<PathBuf>> {
        use rayon::prelude::*;

        requests.par_iter().map(|request| self.fetch(request)).collect()
    }
}

fn is_present(request: &FetchRequest) -> Result<bool> {
    let metadata = match fs::metadata(&request.dest) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::filesystem(&request.dest, e)),
    };

    if !metadata.is_file() {
        return Err(Error::InvalidArgument(format!(
            "destination {} exists and is not a file",
            request.dest.display()
        )));
    }

    match request.expected_size {
        Some(expected) if expected != metadata.len() => {
            warn!(
                dest = %request.dest.display(),
                expected,
                actual = metadata.len(),
                "local copy has the wrong size, fetching again"
            );
            Ok(false)
        }
        _ => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::part_path;
    use std::io::Cursor;

    fn body(bytes: &'static [u8]) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(bytes.to_vec())))
    }

    struct BrokenBody;

    impl Read for BrokenBody {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))
        }
    }

    #[test]
    fn test_second_call_makes_no_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("data/file.csv");

        let mut transport = MockTransport::new();
        transport
            .expect_open()
            .times(1)
            .returning(|_| body(b"a,b\n1,2\n"));
        let fetcher = Fetcher::new(Arc::new(transport));

        let first = fetcher.ensure_local("https://example.org/file.csv", &dest).unwrap();
        let second = fetcher.ensure_local("https://example.org/file.csv", &dest).unwrap();

        assert_eq!(first, dest);
        assert_eq!(second, dest);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_status_error_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing.csv");

        let mut transport = MockTransport::new();
        transport.expect_open().returning(|url| {
            Err(Error::Status {
                url: url.to_string(),
                status: 404,
            })
        });
        let fetcher = Fetcher::new(Arc::new(transport));

        let err = fetcher.ensure_local("https://example.org/missing.csv", &dest).unwrap_err();
        assert_eq!(dataprep_core::Error::from(err).kind(), dataprep_core::ErrorKind::Network);
        assert!(!dest.exists());
    }

    #[test]
    fn test_interrupted_body_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");

        let mut transport = MockTransport::new();
        transport
            .expect_open()
            .returning(|_| Ok(Box::new(BrokenBody) as Box<dyn Read + Send>));
        let fetcher = Fetcher::new(Arc::new(transport));

        let err = fetcher.ensure_local("https://example.org/file.bin", &dest).unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert!(!dest.exists());
        assert!(!part_path(&dest).unwrap().exists());
    }

    #[test]
    fn test_short_body_fails_size_check() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");

        let mut transport = MockTransport::new();
        transport.expect_open().returning(|_| body(b"abc"));
        let fetcher = Fetcher::new(Arc::new(transport));

        let request = FetchRequest::new("https://example.org/file.bin", &dest).with_expected_size(10);
        assert!(matches!(fetcher.fetch(&request), Err(Error::Network { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn test_stale_copy_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        fs::write(&dest, b"ab").unwrap();

        let mut transport = MockTransport::new();
        transport.expect_open().times(1).returning(|_| body(b"abcd"));
        let fetcher = Fetcher::new(Arc::new(transport));

        let request = FetchRequest::new("https://example.org/file.bin", &dest).with_expected_size(4);
        fetcher.fetch(&request).unwrap();
        fetcher.fetch(&request).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"abcd");
    }

    #[test]
    fn test_unwritable_destination_is_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let mut transport = MockTransport::new();
        transport.expect_open().returning(|_| body(b"data"));
        let fetcher = Fetcher::new(Arc::new(transport));

        let err = fetcher
            .ensure_local("https://example.org/file.csv", &blocker.join("file.csv"))
            .unwrap_err();
        assert_eq!(dataprep_core::Error::from(err).kind(), dataprep_core::ErrorKind::Filesystem);
    }

    #[test]
    fn test_fetch_all_keeps_order() {
        let dir = tempfile::tempdir().unwrap();

        let mut transport = MockTransport::new();
        transport.expect_open().times(2).returning(|_| body(b"x"));
        let fetcher = Fetcher::new(Arc::new(transport));

        let requests = vec![
            FetchRequest::new("https://example.org/a", dir.path().join("a")),
            FetchRequest::new("https://example.org/b", dir.path().join("b")),
        ];
        let paths = fetcher.fetch_all(&requests).unwrap();
        assert_eq!(paths, vec![dir.path().join("a"), dir.path().join("b")]);
    }
}
