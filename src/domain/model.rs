use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Post metadata as returned by the `/process` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub profile: String,
    #[serde(rename = "postID")]
    pub post_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resolutions: Vec<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub repost_count: u64,
}

// The backend encodes an empty resolution list as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Output container requested from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Mp4,
    Ts,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Mp4, Format::Ts];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Mp4 => "mp4",
            Format::Ts => "ts",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Mp4 => write!(f, "MP4"),
            Format::Ts => write!(f, "MPEG TS"),
        }
    }
}

/// Body of the `/download` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRequest {
    pub profile: String,
    #[serde(rename = "postID")]
    pub post_id: String,
    pub resolution: String,
    pub format: Format,
}

#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub location: String,
    pub suggested_filename: String,
}

/// Decoded thumbnail, RGBA8.
#[derive(Clone)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for Thumbnail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thumbnail")
            .field("url", &self.url)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
