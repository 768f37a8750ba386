use crate::api::ApiClient;
use crate::application::{DownloadCoordinator, DownloadEvent};
use crate::config;
use crate::domain::{AppError, DownloadPlan, DownloadWorkflow, Metadata, RequestToken, Thumbnail};
use crate::ui::{DownloadMessage, DownloadView};
use futures::StreamExt;
use iced::task;
use iced::Task;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct DownloadApp {
    view: DownloadView,
    workflow: DownloadWorkflow,
    coordinator: DownloadCoordinator,
    // Aborts the metadata fetch that is still in flight
    fetch_handle: Option<task::Handle>,
}

impl Default for DownloadApp {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadApp {
    pub fn new() -> Self {
        let api_client = ApiClient::new(config::load());

        Self {
            view: DownloadView::default(),
            workflow: DownloadWorkflow::new(),
            coordinator: DownloadCoordinator::new(api_client),
            fetch_handle: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    UiMessage(DownloadMessage),
    MetadataFetched(RequestToken, Result<Metadata, AppError>),
    ThumbnailLoaded(Result<Thumbnail, AppError>),
    DownloadPrepared(Result<DownloadPlan, AppError>),
    /// (Selected Path, Download plan)
    FileSaveSelected(Option<PathBuf>, DownloadPlan),
    Download(DownloadEvent),
}

pub fn update(app: &mut DownloadApp, message: Message) -> Task<Message> {
    match message {
        Message::UiMessage(ui_msg) => {
            app.view.update(ui_msg.clone());

            match ui_msg {
                DownloadMessage::FormatSelected(format) => app.workflow.select_format(format),
                DownloadMessage::ResolutionSelected(resolution) => {
                    if !app.workflow.select_resolution(&resolution) {
                        debug!(resolution = %resolution, "resolution not selectable");
                    }
                }
                DownloadMessage::ProcessPressed => return start_fetch(app),
                DownloadMessage::DownloadPressed => return start_download(app),
                DownloadMessage::PostUrlChanged(_) => {}
            }
        }
        Message::MetadataFetched(token, result) => {
            let succeeded = result.is_ok();
            if !app.workflow.finish_fetch(token, result) {
                return Task::none();
            }
            app.fetch_handle = None;

            if !succeeded {
                app.view.status_message.clear();
                return Task::none();
            }

            app.view.thumbnail = None;
            app.view.status_message = "Choose a resolution and press Download".to_string();

            let thumbnail_url = app
                .workflow
                .metadata()
                .map(|metadata| metadata.thumbnail.clone())
                .filter(|url| !url.is_empty());

            if let Some(url) = thumbnail_url {
                let coordinator = app.coordinator.clone();
                return Task::perform(
                    async move { coordinator.load_thumbnail(url).await },
                    Message::ThumbnailLoaded,
                );
            }
        }
        Message::ThumbnailLoaded(result) => match result {
            Ok(thumbnail) => {
                let current = app
                    .workflow
                    .metadata()
                    .is_some_and(|metadata| metadata.thumbnail == thumbnail.url);
                if current {
                    app.view.set_thumbnail(thumbnail);
                }
            }
            Err(e) => warn!(error = %e, "thumbnail unavailable"),
        },
        Message::DownloadPrepared(result) => match result {
            Ok(plan) => {
                app.view.status_message = "Please select save location...".to_string();

                let coordinator = app.coordinator.clone();
                let suggested_filename = plan.suggested_filename.clone();
                return Task::perform(
                    async move { coordinator.choose_save_path(suggested_filename).await },
                    move |path| Message::FileSaveSelected(path, plan),
                );
            }
            Err(e) => {
                app.workflow.finish_download(Err(e));
                app.view.status_message.clear();
            }
        },
        Message::FileSaveSelected(path_opt, plan) => match path_opt {
            Some(path) => {
                app.view.status_message = format!("Downloading to: {}", path.display());

                return Task::stream(
                    app.coordinator
                        .download_stream(plan.location, path)
                        .map(Message::Download),
                );
            }
            None => {
                // User cancelled dialog
                app.workflow.cancel_download();
                app.view.status_message = "Download cancelled".to_string();
            }
        },
        Message::Download(event) => match event {
            DownloadEvent::Progress(progress) => {
                app.workflow.set_progress(progress);
                if progress >= 1.0 {
                    app.view.status_message = "Download complete, finalizing...".to_string();
                } else {
                    app.view.status_message = format!("Downloading: {:.1}%", progress * 100.0);
                }
            }
            DownloadEvent::Completed(path) => {
                app.workflow.finish_download(Ok(path.clone()));
                app.view.status_message = format!("Saved: {}", path.display());
            }
            DownloadEvent::Failed(e) => {
                app.workflow.finish_download(Err(e));
                app.view.status_message.clear();
            }
        },
    }
    Task::none()
}

fn start_fetch(app: &mut DownloadApp) -> Task<Message> {
    let token = match app.workflow.begin_fetch(&app.view.post_url) {
        Ok(token) => token,
        Err(e) => {
            debug!(error = %e, "fetch not started");
            if e != AppError::Busy && !app.workflow.is_fetching() {
                app.view.status_message.clear();
            }
            return Task::none();
        }
    };

    if let Some(handle) = app.fetch_handle.take() {
        handle.abort();
    }

    app.view.status_message = "Fetching metadata...".to_string();

    let coordinator = app.coordinator.clone();
    let post_url = app.view.post_url.trim().to_string();
    let (task, handle) = Task::perform(
        async move { coordinator.fetch_metadata(post_url).await },
        move |result| Message::MetadataFetched(token, result),
    )
    .abortable();

    app.fetch_handle = Some(handle);
    task
}

fn start_download(app: &mut DownloadApp) -> Task<Message> {
    let request = match app.workflow.begin_download() {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "download not started");
            if e != AppError::Busy {
                app.view.status_message.clear();
            }
            return Task::none();
        }
    };

    app.view.status_message = "Preparing download...".to_string();

    let coordinator = app.coordinator.clone();
    Task::perform(
        async move { coordinator.prepare_download(request).await },
        Message::DownloadPrepared,
    )
}

pub fn view(app: &DownloadApp) -> iced::Element<'_, Message> {
    app.view.view(&app.workflow).map(Message::UiMessage)
}
