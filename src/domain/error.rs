use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("Please enter a URL.")]
    MissingUrl,

    #[error("Please select a resolution first")]
    NoResolution,

    #[error("Another request is still in progress")]
    Busy,

    #[error("Failed to fetch metadata")]
    Fetch,

    #[error("Failed to download video: {0}")]
    Download(String),

    #[error("Failed to load thumbnail: {0}")]
    Thumbnail(String),

    #[error("I/O error: {0}")]
    Io(String),
}
