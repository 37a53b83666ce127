use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::{PipeError, PipeResult};

/// The one remote hop in the pipeline: `GET url -> body bytes`. Downloaders
/// only see this trait, tests script it, the binary plugs in
/// [`HttpFetcher`].
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'_, PipeResult<Bytes>>;
}

/// `reqwest`-backed fetcher. One client shared by every downloader.
#[derive(Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'_, PipeResult<Bytes>> {
        let url = url.to_string();
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| PipeError::transport(&url, e.to_string()))?;
            if !response.status().is_success() {
                return Err(PipeError::transport(
                    &url,
                    format!("server responded with {}", response.status()),
                ));
            }
            response
                .bytes()
                .await
                .map_err(|e| PipeError::transport(&url, e.to_string()))
        })
    }
}
