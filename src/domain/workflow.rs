use std::mem;
use std::path::PathBuf;

use tracing::debug;

use super::{AppError, DownloadRequest, Format, Metadata};
use crate::utils::highest_resolution;

/// Identifies one metadata fetch. Only the latest token is ever applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// Fetched metadata together with the chosen resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub metadata: Metadata,
    pub resolution: Option<String>,
}

impl Selection {
    pub fn new(metadata: Metadata) -> Self {
        let resolution = highest_resolution(&metadata.resolutions).map(str::to_string);
        Self {
            metadata,
            resolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    Idle,
    Fetching {
        token: RequestToken,
        previous: Option<Selection>,
    },
    Ready(Selection),
    Downloading {
        selection: Selection,
        progress: f32,
    },
    /// `previous` is whatever was on screen when the action failed.
    Error {
        error: AppError,
        previous: Option<Selection>,
    },
}

/// Owns the fetch-then-download state of one window.
#[derive(Debug)]
pub struct DownloadWorkflow {
    state: WorkflowState,
    format: Format,
    last_token: u64,
}

impl Default for DownloadWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadWorkflow {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Idle,
            format: Format::default(),
            last_token: 0,
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// The selection currently shown to the user, if any.
    pub fn selection(&self) -> Option<&Selection> {
        match &self.state {
            WorkflowState::Idle => None,
            WorkflowState::Fetching { previous, .. } | WorkflowState::Error { previous, .. } => {
                previous.as_ref()
            }
            WorkflowState::Ready(selection) | WorkflowState::Downloading { selection, .. } => {
                Some(selection)
            }
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.selection().map(|s| &s.metadata)
    }

    pub fn error(&self) -> Option<&AppError> {
        match &self.state {
            WorkflowState::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.state, WorkflowState::Fetching { .. })
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self.state, WorkflowState::Downloading { .. })
    }

    pub fn select_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Returns false when `resolution` is not offered by the current metadata
    /// or the workflow is busy.
    pub fn select_resolution(&mut self, resolution: &str) -> bool {
        let selection = match &mut self.state {
            WorkflowState::Ready(selection) => selection,
            WorkflowState::Error {
                previous: Some(selection),
                ..
            } => selection,
            _ => return false,
        };

        if !selection.metadata.resolutions.iter().any(|r| r == resolution) {
            return false;
        }

        selection.resolution = Some(resolution.to_string());
        true
    }

    /// Start a metadata fetch. A fetch already in flight is superseded:
    /// its response will no longer be applied. An empty URL never
    /// supersedes a pending fetch.
    pub fn begin_fetch(&mut self, url: &str) -> Result<RequestToken, AppError> {
        if self.is_downloading() {
            return Err(AppError::Busy);
        }

        if url.trim().is_empty() {
            if self.is_fetching() {
                return Err(AppError::MissingUrl);
            }
            return Err(self.fail(AppError::MissingUrl));
        }

        self.last_token += 1;
        let token = RequestToken(self.last_token);
        let previous = self.take_selection();
        debug!(?token, "metadata fetch started");
        self.state = WorkflowState::Fetching { token, previous };

        Ok(token)
    }

    /// Apply a fetch result. Returns false if the result was stale and dropped.
    pub fn finish_fetch(&mut self, token: RequestToken, result: Result<Metadata, AppError>) -> bool {
        match &self.state {
            WorkflowState::Fetching { token: current, .. } if *current == token => {}
            _ => {
                debug!(?token, "dropping stale metadata response");
                return false;
            }
        }

        let previous = self.take_selection();
        self.state = match result {
            Ok(metadata) => WorkflowState::Ready(Selection::new(metadata)),
            Err(error) => WorkflowState::Error { error, previous },
        };

        true
    }

    /// Validate the selection and move to `Downloading`.
    pub fn begin_download(&mut self) -> Result<DownloadRequest, AppError> {
        if self.is_fetching() || self.is_downloading() {
            return Err(AppError::Busy);
        }

        let format = self.format;
        let request = self.selection().and_then(|selection| {
            Some(DownloadRequest {
                profile: selection.metadata.profile.clone(),
                post_id: selection.metadata.post_id.clone(),
                resolution: selection.resolution.clone()?,
                format,
            })
        });
        let Some(request) = request else {
            return Err(self.fail(AppError::NoResolution));
        };

        if let Some(selection) = self.take_selection() {
            self.state = WorkflowState::Downloading {
                selection,
                progress: 0.0,
            };
        }

        Ok(request)
    }

    pub fn set_progress(&mut self, value: f32) {
        if let WorkflowState::Downloading { progress, .. } = &mut self.state {
            *progress = value.clamp(0.0, 1.0);
        }
    }

    pub fn finish_download(&mut self, result: Result<PathBuf, AppError>) -> bool {
        if !self.is_downloading() {
            return false;
        }

        let previous = self.take_selection();
        self.state = match (result, previous) {
            (Ok(path), Some(selection)) => {
                debug!(path = %path.display(), "download finished");
                WorkflowState::Ready(selection)
            }
            (Ok(_), None) => WorkflowState::Idle,
            (Err(error), previous) => WorkflowState::Error { error, previous },
        };

        true
    }

    /// The user dismissed the save dialog.
    pub fn cancel_download(&mut self) {
        if let WorkflowState::Downloading { .. } = self.state {
            self.state = match self.take_selection() {
                Some(selection) => WorkflowState::Ready(selection),
                None => WorkflowState::Idle,
            };
        }
    }

    fn take_selection(&mut self) -> Option<Selection> {
        match mem::replace(&mut self.state, WorkflowState::Idle) {
            WorkflowState::Idle => None,
            WorkflowState::Fetching { previous, .. } | WorkflowState::Error { previous, .. } => {
                previous
            }
            WorkflowState::Ready(selection) | WorkflowState::Downloading { selection, .. } => {
                Some(selection)
            }
        }
    }

    fn fail(&mut self, error: AppError) -> AppError {
        let previous = self.take_selection();
        self.state = WorkflowState::Error {
            error: error.clone(),
            previous,
        };
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(resolutions: &[&str]) -> Metadata {
        Metadata {
            profile: "linuxlock.bsky.social".to_string(),
            post_id: "3lerbmbhs447".to_string(),
            title: "clip".to_string(),
            thumbnail: "https://video.bsky.app/thumb.jpg".to_string(),
            resolutions: resolutions.iter().map(|r| r.to_string()).collect(),
            like_count: 1500,
            reply_count: 2,
            repost_count: 0,
        }
    }

    fn ready(resolutions: &[&str]) -> DownloadWorkflow {
        let mut workflow = DownloadWorkflow::new();
        let token = workflow.begin_fetch("https://bsky.app/profile/a/post/b").unwrap();
        assert!(workflow.finish_fetch(token, Ok(metadata(resolutions))));
        workflow
    }

    #[test]
    fn test_fetch_selects_highest_resolution() {
        let workflow = ready(&["480p", "1080p", "720p"]);
        let selection = workflow.selection().unwrap();
        assert_eq!(selection.resolution.as_deref(), Some("1080p"));
        assert!(matches!(workflow.state(), WorkflowState::Ready(_)));
    }

    #[test]
    fn test_empty_url_is_rejected() {
        let mut workflow = DownloadWorkflow::new();
        assert_eq!(workflow.begin_fetch("   "), Err(AppError::MissingUrl));
        assert_eq!(workflow.error(), Some(&AppError::MissingUrl));
        assert!(!workflow.is_fetching());
    }

    #[test]
    fn test_empty_url_keeps_pending_fetch() {
        let mut workflow = DownloadWorkflow::new();
        let token = workflow.begin_fetch("https://bsky.app/profile/a/post/b").unwrap();

        assert_eq!(workflow.begin_fetch(""), Err(AppError::MissingUrl));
        assert!(workflow.is_fetching());

        assert!(workflow.finish_fetch(token, Ok(metadata(&["720p"]))));
        assert!(matches!(workflow.state(), WorkflowState::Ready(_)));
    }

    #[test]
    fn test_fetch_failure_keeps_previous_metadata() {
        let mut workflow = ready(&["720p"]);
        let before = workflow.metadata().cloned();

        let token = workflow.begin_fetch("https://bsky.app/profile/a/post/c").unwrap();
        assert!(workflow.is_fetching());
        assert!(workflow.finish_fetch(token, Err(AppError::Fetch)));

        assert_eq!(workflow.error(), Some(&AppError::Fetch));
        assert_eq!(workflow.metadata().cloned(), before);
    }

    #[test]
    fn test_fetch_failure_from_idle() {
        let mut workflow = DownloadWorkflow::new();
        let token = workflow.begin_fetch("x").unwrap();
        workflow.finish_fetch(token, Err(AppError::Fetch));

        assert_eq!(
            workflow.state(),
            &WorkflowState::Error {
                error: AppError::Fetch,
                previous: None
            }
        );
    }

    #[test]
    fn test_stale_fetch_response_is_dropped() {
        let mut workflow = DownloadWorkflow::new();
        let first = workflow.begin_fetch("first").unwrap();
        let second = workflow.begin_fetch("second").unwrap();
        assert!(second > first);

        assert!(workflow.finish_fetch(second, Ok(metadata(&["720p"]))));
        assert!(!workflow.finish_fetch(first, Ok(metadata(&["1080p"]))));

        let selection = workflow.selection().unwrap();
        assert_eq!(selection.resolution.as_deref(), Some("720p"));
    }

    #[test]
    fn test_download_without_resolution() {
        let mut workflow = DownloadWorkflow::new();
        assert_eq!(workflow.begin_download(), Err(AppError::NoResolution));
        assert_eq!(
            workflow.error().map(|e| e.to_string()).as_deref(),
            Some("Please select a resolution first")
        );

        let mut workflow = ready(&[]);
        assert!(workflow.selection().unwrap().resolution.is_none());
        assert_eq!(workflow.begin_download(), Err(AppError::NoResolution));
        // metadata survives the validation error
        assert!(workflow.metadata().is_some());
    }

    #[test]
    fn test_download_request_uses_selection() {
        let mut workflow = ready(&["720p", "1080p"]);
        workflow.select_format(Format::Ts);
        assert!(workflow.select_resolution("720p"));
        assert!(!workflow.select_resolution("4k"));

        let request = workflow.begin_download().unwrap();
        assert_eq!(request.post_id, "3lerbmbhs447");
        assert_eq!(request.resolution, "720p");
        assert_eq!(request.format, Format::Ts);
        assert!(workflow.is_downloading());

        // busy while downloading
        assert_eq!(workflow.begin_download(), Err(AppError::Busy));
        assert_eq!(workflow.begin_fetch("again"), Err(AppError::Busy));
    }

    #[test]
    fn test_download_returns_to_ready() {
        let mut workflow = ready(&["720p"]);
        workflow.begin_download().unwrap();
        workflow.set_progress(0.5);
        assert!(matches!(
            workflow.state(),
            WorkflowState::Downloading { progress, .. } if *progress == 0.5
        ));

        assert!(workflow.finish_download(Ok(PathBuf::from("/tmp/3lerbmbhs447.mp4"))));
        assert!(matches!(workflow.state(), WorkflowState::Ready(_)));
    }

    #[test]
    fn test_download_failure_keeps_metadata() {
        let mut workflow = ready(&["720p"]);
        workflow.begin_download().unwrap();
        workflow.finish_download(Err(AppError::Download("HTTP 500".to_string())));

        assert!(matches!(workflow.error(), Some(AppError::Download(_))));
        assert_eq!(workflow.metadata().unwrap().post_id, "3lerbmbhs447");

        // a new attempt is possible straight away
        assert!(workflow.begin_download().is_ok());
    }

    #[test]
    fn test_cancel_download() {
        let mut workflow = ready(&["720p"]);
        workflow.begin_download().unwrap();
        workflow.cancel_download();
        assert!(matches!(workflow.state(), WorkflowState::Ready(_)));
        assert!(!workflow.finish_download(Ok(PathBuf::new())));
    }
}
