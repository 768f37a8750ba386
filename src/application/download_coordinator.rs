use std::path::PathBuf;

use futures::{stream::BoxStream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::{
    api::ApiClient,
    domain::{AppError, DownloadPlan, DownloadRequest, Metadata, Thumbnail},
    utils::save_filename,
};

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    Progress(f32),
    Completed(PathBuf),
    Failed(AppError),
}

/// Runs the remote side of the workflow. Every failure is logged with its
/// cause and handed back as a user-facing [`AppError`].
#[derive(Clone)]
pub struct DownloadCoordinator {
    api_client: ApiClient,
}

impl DownloadCoordinator {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }

    pub async fn fetch_metadata(&self, post_url: String) -> Result<Metadata, AppError> {
        self.api_client
            .fetch_metadata(&post_url)
            .await
            .map_err(|e| {
                warn!(post_url = %post_url, error = %e, "metadata fetch failed");
                AppError::Fetch
            })
    }

    pub async fn prepare_download(&self, request: DownloadRequest) -> Result<DownloadPlan, AppError> {
        let response = self
            .api_client
            .request_download(&request)
            .await
            .map_err(|e| {
                warn!(post_id = %request.post_id, error = %e, "download request failed");
                AppError::Download(e.to_string())
            })?;

        let location = self
            .api_client
            .resolve_location(&response.filename)
            .map_err(|e| AppError::Download(e.to_string()))?;

        Ok(DownloadPlan {
            location: location.to_string(),
            suggested_filename: save_filename(&request.post_id, request.format),
        })
    }

    pub async fn load_thumbnail(&self, url: String) -> Result<Thumbnail, AppError> {
        let bytes = self
            .api_client
            .fetch_bytes(&url)
            .await
            .map_err(|e| AppError::Thumbnail(e.to_string()))?;

        let rgba = image::load_from_memory(&bytes)
            .map_err(|e| AppError::Thumbnail(e.to_string()))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Thumbnail {
            url,
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    pub async fn choose_save_path(&self, suggested_filename: String) -> Option<PathBuf> {
        rfd::AsyncFileDialog::new()
            .set_file_name(&suggested_filename)
            .save_file()
            .await
            .map(|handle| handle.path().to_path_buf())
    }

    /// Stream `url` into `path`. The file is only created once the server
    /// answers with success, and is removed again if the transfer fails.
    pub fn download_stream(&self, url: String, path: PathBuf) -> BoxStream<'static, DownloadEvent> {
        info!(url = %url, path = %path.display(), "saving file");

        let start = SaveState::Connecting {
            client: self.api_client.clone(),
            url,
            path,
        };

        futures::stream::unfold(start, |state| async move {
            let step = match state {
                SaveState::Connecting { client, url, path } => connect(client, url, path).await,
                SaveState::Writing(transfer) => transfer.advance().await,
                SaveState::Done => return None,
            };
            Some(step)
        })
        .boxed()
    }
}

enum SaveState {
    Connecting {
        client: ApiClient,
        url: String,
        path: PathBuf,
    },
    Writing(Transfer),
    Done,
}

async fn connect(client: ApiClient, url: String, path: PathBuf) -> (DownloadEvent, SaveState) {
    let (total, stream) = match client.download_file_stream(&url).await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "file download failed");
            return (
                DownloadEvent::Failed(AppError::Download(e.to_string())),
                SaveState::Done,
            );
        }
    };

    let file = match tokio::fs::File::create(&path).await {
        Ok(file) => file,
        Err(e) => {
            return (
                DownloadEvent::Failed(AppError::Io(format!("Failed to create file: {}", e))),
                SaveState::Done,
            );
        }
    };

    let transfer = Transfer {
        file,
        stream: stream.boxed(),
        downloaded: 0,
        total,
        path,
    };
    (DownloadEvent::Progress(0.0), SaveState::Writing(transfer))
}

/// An open destination file being filled from the response body.
struct Transfer {
    file: tokio::fs::File,
    stream: BoxStream<'static, crate::api::Result<bytes::Bytes>>,
    downloaded: u64,
    total: Option<u64>,
    path: PathBuf,
}

impl Transfer {
    async fn advance(mut self) -> (DownloadEvent, SaveState) {
        let next = self.stream.next().await;
        match next {
            Some(Ok(chunk)) => {
                if let Err(e) = self.file.write_all(&chunk).await {
                    return self.abandon(AppError::Io(format!("Write error: {}", e))).await;
                }
                self.downloaded += chunk.len() as u64;

                let event = DownloadEvent::Progress(self.progress());
                (event, SaveState::Writing(self))
            }
            Some(Err(e)) => {
                warn!(error = %e, "file download interrupted");
                self.abandon(AppError::Download(e.to_string())).await
            }
            None => {
                if let Err(e) = self.file.sync_all().await {
                    return self
                        .abandon(AppError::Io(format!("Failed to sync file: {}", e)))
                        .await;
                }

                info!(path = %self.path.display(), bytes = self.downloaded, "file saved");
                (DownloadEvent::Completed(self.path), SaveState::Done)
            }
        }
    }

    fn progress(&self) -> f32 {
        match self.total {
            Some(total) if total > 0 => (self.downloaded as f32 / total as f32).min(1.0),
            _ => 0.0,
        }
    }

    // Partial files are never left behind.
    async fn abandon(self, error: AppError) -> (DownloadEvent, SaveState) {
        let Transfer { file, path, .. } = self;
        drop(file);

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "could not remove partial file");
        }

        (DownloadEvent::Failed(error), SaveState::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::domain::{DownloadWorkflow, Format};
    use crate::utils::format_count;
    use mockito::Matcher;
    use serde_json::json;
    use url::Url;

    fn coordinator_for(server: &mockito::Server) -> DownloadCoordinator {
        let config = ApiConfig {
            base_url: Url::parse(&server.url()).unwrap(),
            ..ApiConfig::default()
        };
        DownloadCoordinator::new(ApiClient::new(config))
    }

    #[tokio::test]
    async fn test_fetch_selects_best_resolution_and_formats_likes() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/process")
            .match_body(Matcher::Json(json!({
                "url": "https://bsky.app/profile/a.bsky.social/post/3kx"
            })))
            .with_status(200)
            .with_body(
                json!({
                    "profile": "a.bsky.social",
                    "postID": "3kx",
                    "title": "Sunset",
                    "thumbnail": "",
                    "resolutions": ["720p", "1080p"],
                    "likeCount": 1500,
                    "replyCount": 3,
                    "repostCount": 0
                })
                .to_string(),
            )
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let mut workflow = DownloadWorkflow::new();

        let url = "https://bsky.app/profile/a.bsky.social/post/3kx";
        let token = workflow.begin_fetch(url).unwrap();
        let result = coordinator.fetch_metadata(url.to_string()).await;
        assert!(workflow.finish_fetch(token, result));

        let selection = workflow.selection().unwrap();
        assert_eq!(selection.resolution.as_deref(), Some("1080p"));
        assert_eq!(format_count(selection.metadata.like_count), "1.5K");
    }

    #[tokio::test]
    async fn test_fetch_failure_is_generic() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/process")
            .with_status(500)
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let err = coordinator.fetch_metadata("x".to_string()).await.unwrap_err();
        assert_eq!(err, AppError::Fetch);
        assert_eq!(err.to_string(), "Failed to fetch metadata");
    }

    #[tokio::test]
    async fn test_prepare_download_plan() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/download")
            .with_status(200)
            .with_body(r#"{"filename": "/videos/3kx/3kx_linuxlock.org.ts"}"#)
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let plan = coordinator
            .prepare_download(DownloadRequest {
                profile: "a.bsky.social".to_string(),
                post_id: "3kx".to_string(),
                resolution: "1080p".to_string(),
                format: Format::Ts,
            })
            .await
            .unwrap();

        assert_eq!(plan.suggested_filename, "3kx.ts");
        assert_eq!(
            plan.location,
            format!("{}/videos/3kx/3kx_linuxlock.org.ts", server.url())
        );
    }

    #[tokio::test]
    async fn test_prepare_download_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/download")
            .with_status(500)
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let err = coordinator
            .prepare_download(DownloadRequest {
                profile: "p".to_string(),
                post_id: "x".to_string(),
                resolution: "720p".to_string(),
                format: Format::Mp4,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Download(_)));
    }

    #[tokio::test]
    async fn test_download_stream_writes_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/videos/x.mp4")
            .with_status(200)
            .with_body("video-bytes")
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let path = std::env::temp_dir().join(format!("post-downloader-{}.mp4", std::process::id()));

        let events: Vec<DownloadEvent> = coordinator
            .download_stream(format!("{}/videos/x.mp4", server.url()), path.clone())
            .collect()
            .await;

        assert!(matches!(events.first(), Some(DownloadEvent::Progress(p)) if *p == 0.0));
        assert!(matches!(events.last(), Some(DownloadEvent::Completed(p)) if *p == path));
        assert_eq!(std::fs::read(&path).unwrap(), b"video-bytes");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_download_stream_reports_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/videos/missing.mp4")
            .with_status(404)
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let path = std::env::temp_dir().join(format!(
            "post-downloader-missing-{}.mp4",
            std::process::id()
        ));

        let events: Vec<DownloadEvent> = coordinator
            .download_stream(format!("{}/videos/missing.mp4", server.url()), path.clone())
            .collect()
            .await;

        assert!(matches!(
            events.as_slice(),
            [DownloadEvent::Failed(AppError::Download(_))]
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_http_error_leaves_existing_file_alone() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/videos/gone.ts")
            .with_status(500)
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let path = std::env::temp_dir().join(format!(
            "post-downloader-existing-{}.ts",
            std::process::id()
        ));
        std::fs::write(&path, b"older download").unwrap();

        let events: Vec<DownloadEvent> = coordinator
            .download_stream(format!("{}/videos/gone.ts", server.url()), path.clone())
            .collect()
            .await;

        assert!(matches!(events.last(), Some(DownloadEvent::Failed(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"older download");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_unwritable_destination_reports_io_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/videos/x.mp4")
            .with_status(200)
            .with_body("video-bytes")
            .create_async()
            .await;

        let coordinator = coordinator_for(&server);
        let path = std::env::temp_dir()
            .join(format!("post-downloader-no-such-dir-{}", std::process::id()))
            .join("x.mp4");

        let events: Vec<DownloadEvent> = coordinator
            .download_stream(format!("{}/videos/x.mp4", server.url()), path.clone())
            .collect()
            .await;

        assert!(matches!(
            events.as_slice(),
            [DownloadEvent::Failed(AppError::Io(_))]
        ));
        assert!(!path.exists());
    }
}
