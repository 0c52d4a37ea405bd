//! Byte fetchers for resolved resource locations.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Fetch future type alias.
pub type FetchFut<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("{reason}")]
    Transport { reason: String },

    #[error("unsupported scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },
}

/// Retrieves the raw bytes behind a URL.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFut<'a>;
}

/// `http` / `https` fetcher with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFut<'a> {
        Box::pin(async move {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| FetchError::Transport {
                    reason: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(|e| FetchError::Transport {
                reason: e.to_string(),
            })?;
            Ok(body.to_vec())
        })
    }
}

/// `file` URL fetcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFut<'a> {
        Box::pin(async move {
            let path = url.to_file_path().map_err(|()| FetchError::Transport {
                reason: format!("{url} is not a local file path"),
            })?;
            tokio::fs::read(&path)
                .await
                .map_err(|e| FetchError::Transport {
                    reason: format!("{}: {e}", path.display()),
                })
        })
    }
}

/// Routes by URL scheme: `http`/`https` over HTTP, `file` from disk.
#[derive(Debug, Clone)]
pub struct SchemeFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SchemeFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpFetcher::new(timeout)?,
            file: FileFetcher,
        })
    }
}

impl Fetcher for SchemeFetcher {
    fn fetch<'a>(&'a self, url: &'a Url) -> FetchFut<'a> {
        match url.scheme() {
            "http" | "https" => self.http.fetch(url),
            "file" => self.file.fetch(url),
            other => {
                let err = FetchError::UnsupportedScheme {
                    scheme: other.to_string(),
                };
                Box::pin(async move { Err(err) })
            }
        }
    }
}
