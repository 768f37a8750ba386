use std::time::Duration;

use futures::Stream;
use futures::TryStreamExt;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::models::{DownloadResponse, ProcessRequest};
use crate::config::ApiConfig;
use crate::domain::{DownloadRequest, Metadata};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Server responded with status {0}")]
    Status(u16),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Invalid file location: {0}")]
    InvalidLocation(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Endpoint URL relative to the configured base, keeping any base path.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.config.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }

        base.join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidLocation(e.to_string()))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("JSON decode error: {}", e)))
    }

    /// `POST /process`: look up the metadata of a post
    pub async fn fetch_metadata(&self, post_url: &str) -> Result<Metadata> {
        let url = self.endpoint("process")?;
        info!(post_url, "fetching metadata");

        let response = self
            .http
            .post(url)
            .timeout(self.timeout())
            .json(&ProcessRequest { url: post_url })
            .send()
            .await?;

        let metadata: Metadata = Self::read_json(response).await?;
        debug!(
            post_id = %metadata.post_id,
            resolutions = ?metadata.resolutions,
            "metadata received"
        );

        Ok(metadata)
    }

    /// `POST /download`: ask the backend to render the file
    pub async fn request_download(&self, request: &DownloadRequest) -> Result<DownloadResponse> {
        let url = self.endpoint("download")?;
        info!(
            post_id = %request.post_id,
            resolution = %request.resolution,
            format = request.format.extension(),
            "requesting download"
        );

        let response = self
            .http
            .post(url)
            .timeout(self.timeout())
            .json(request)
            .send()
            .await?;

        let download: DownloadResponse = Self::read_json(response).await?;
        if download.filename.trim().is_empty() {
            return Err(ApiError::InvalidResponse("empty filename".to_string()));
        }

        Ok(download)
    }

    /// Turn the `filename` returned by `/download` into an absolute URL.
    /// Paths resolve against the base URL; absolute http(s) URLs pass through.
    pub fn resolve_location(&self, filename: &str) -> Result<Url> {
        let location = self
            .config
            .base_url
            .join(filename.trim())
            .map_err(|e| ApiError::InvalidLocation(format!("{}: {}", filename, e)))?;

        match location.scheme() {
            "http" | "https" => Ok(location),
            other => Err(ApiError::InvalidLocation(format!(
                "unsupported scheme '{}'",
                other
            ))),
        }
    }

    /// Fetch a small resource (thumbnails) in one piece
    pub async fn fetch_bytes(&self, url: &str) -> Result<bytes::Bytes> {
        let response = self.http.get(url).timeout(self.timeout()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }

    /// Download file with progress stream
    /// Returns (total_size, stream)
    pub async fn download_file_stream(
        &self,
        download_url: &str,
    ) -> Result<(Option<u64>, impl Stream<Item = Result<bytes::Bytes>>)> {
        let response = self.http.get(download_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        let total_size = response.content_length();
        let stream = response.bytes_stream().map_err(ApiError::RequestError);

        Ok((total_size, stream))
    }
}
