//! HTTP(S) archive download

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::archive::{self, Layout};
use super::{ContentFetcher, snapshot_dir};
use crate::snapshot::RemoteTreeSnapshot;
use crate::source::SourceRef;
use crate::{Error, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("launcher-updater/", env!("CARGO_PKG_VERSION"));

/// Downloads the whole tree as one zip archive.
#[derive(Debug, Clone)]
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    temp_root: Option<PathBuf>,
}

impl HttpArchiveFetcher {
    /// Client with a total request timeout of `timeout`, which must be
    /// non-zero.
    pub fn new(timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::config("fetch timeout must be positive"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            temp_root: None,
        }
    }

    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network {
                url: url.to_string(),
                message: format!("HTTP {status}"),
            });
        }

        let body = response.bytes().await.map_err(|e| network(url, &e))?;
        Ok(body.to_vec())
    }
}

fn network(url: &str, err: &reqwest::Error) -> Error {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };

    Error::Network {
        url: url.to_string(),
        message,
    }
}

#[async_trait]
impl ContentFetcher for HttpArchiveFetcher {
    async fn fetch(
        &self,
        source: &SourceRef,
        cancel: &CancellationToken,
    ) -> Result<RemoteTreeSnapshot> {
        let url = source.archive_url().ok_or_else(|| Error::InvalidSource {
            input: source.to_string(),
            reason: "not a downloadable source".into(),
        })?;

        tracing::info!(%url, "Downloading archive");
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.download(&url) => result?,
        };
        tracing::debug!(bytes = payload.len(), "Download complete");

        let dir = snapshot_dir(self.temp_root.as_deref())?;
        let dest = dir.path().to_path_buf();
        let cancel = cancel.clone();
        let unpack_url = url.clone();
        let layout = match source {
            SourceRef::Hosted { .. } => Layout::Wrapped,
            _ => Layout::Flat,
        };
        // `dir` is dropped, and the partial tree removed, on any error below.
        let root = tokio::task::spawn_blocking(move || {
            archive::unpack(&payload, &dest, &unpack_url, layout, &cancel)
        })
        .await??;

        Ok(RemoteTreeSnapshot::new(dir, root, source.clone()))
    }
}
