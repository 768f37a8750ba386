use serde::{Deserialize, Serialize};

/// Body of the `/process` request
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRequest<'a> {
    pub url: &'a str,
}

/// Response from the `/download` endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadResponse {
    /// URL or path of the rendered file
    pub filename: String,
}
