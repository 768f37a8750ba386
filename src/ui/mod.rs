use iced::{
    widget::{
        button, column, image, pick_list, progress_bar, row, text, text_input, Column, Space,
    },
    Alignment, Element, Length,
};

use crate::domain::{DownloadWorkflow, Format, Selection, Thumbnail, WorkflowState};
use crate::utils::format_count;

const HOW_IT_WORKS: [&str; 4] = [
    "1. Copy the link to the post with the video.",
    "2. Paste it above and press Process.",
    "3. Pick a resolution and a format.",
    "4. Press Download and choose where to save the file.",
];

/// Main view state
pub struct DownloadView {
    pub post_url: String,
    pub status_message: String,
    /// Decoded thumbnail, keyed by the URL it was loaded from
    pub thumbnail: Option<(String, image::Handle)>,
}

impl Default for DownloadView {
    fn default() -> Self {
        Self {
            post_url: String::new(),
            status_message: "Paste a post link to get started".to_string(),
            thumbnail: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DownloadMessage {
    PostUrlChanged(String),
    FormatSelected(Format),
    ResolutionSelected(String),
    ProcessPressed,
    DownloadPressed,
}

impl DownloadView {
    pub fn update(&mut self, message: DownloadMessage) {
        match message {
            DownloadMessage::PostUrlChanged(url) => {
                self.post_url = url;
            }
            _ => {
                // Will be handled by the app
            }
        }
    }

    pub fn set_thumbnail(&mut self, thumbnail: Thumbnail) {
        let handle = image::Handle::from_rgba(thumbnail.width, thumbnail.height, thumbnail.pixels);
        self.thumbnail = Some((thumbnail.url, handle));
    }

    pub fn view<'a>(&'a self, workflow: &'a DownloadWorkflow) -> Element<'a, DownloadMessage> {
        let busy = workflow.is_fetching() || workflow.is_downloading();

        let process_label = if workflow.is_fetching() {
            "Processing..."
        } else {
            "Process"
        };

        let input_row = row![
            text_input("Paste post link: https://bsky.app/profile/…/post/…", &self.post_url)
                .on_input(DownloadMessage::PostUrlChanged)
                .on_submit(DownloadMessage::ProcessPressed)
                .padding(10)
                .width(Length::Fill),
            pick_list(
                Format::ALL,
                Some(workflow.format()),
                DownloadMessage::FormatSelected
            )
            .padding(10),
            button(process_label)
                .on_press_maybe((!busy).then_some(DownloadMessage::ProcessPressed))
                .padding([10, 20]),
        ]
        .spacing(10)
        .align_y(Alignment::Center);

        let mut content = column![
            text("Post Video Downloader").size(32),
            Space::new().height(Length::Fixed(20.0)),
            input_row,
        ]
        .padding(20)
        .spacing(10);

        if let Some(error) = workflow.error() {
            content = content.push(text(error.to_string()).size(14));
        }

        if workflow.is_fetching() {
            content = content.push(text("Loading metadata...").size(14));
        }

        if let Some(selection) = workflow.selection() {
            content = content.push(self.metadata_card(selection, workflow));
        }

        content = content
            .push(Space::new().height(Length::Fixed(10.0)))
            .push(text(&self.status_message).size(14))
            .push(Space::new().height(Length::Fixed(20.0)))
            .push(text("How it works").size(18));

        for step in HOW_IT_WORKS {
            content = content.push(text(step).size(14));
        }

        content.into()
    }

    fn metadata_card<'a>(
        &'a self,
        selection: &'a Selection,
        workflow: &'a DownloadWorkflow,
    ) -> Element<'a, DownloadMessage> {
        let metadata = &selection.metadata;
        let mut card = Column::new().spacing(10);

        if let Some((url, handle)) = &self.thumbnail {
            if *url == metadata.thumbnail {
                card = card.push(image(handle.clone()).width(Length::Fixed(320.0)));
            }
        }

        let title = if metadata.title.is_empty() {
            format!("{} / {}", metadata.profile, metadata.post_id)
        } else {
            metadata.title.clone()
        };
        card = card.push(text(title).size(22));

        card = card.push(
            row![
                text(format!("♥ {}", format_count(metadata.like_count))),
                text(format!("Replies {}", format_count(metadata.reply_count))),
                text(format!("Reposts {}", format_count(metadata.repost_count))),
            ]
            .spacing(30),
        );

        let controls_enabled = !workflow.is_fetching() && !workflow.is_downloading();

        let resolution_picker = pick_list(
            metadata.resolutions.as_slice(),
            selection.resolution.clone(),
            DownloadMessage::ResolutionSelected,
        )
        .placeholder("Select resolution")
        .padding(10)
        .width(Length::Fill);
        card = card.push(resolution_picker);

        let download_label = if workflow.is_downloading() {
            "Downloading..."
        } else {
            "Download"
        };
        card = card.push(
            button(download_label)
                .on_press_maybe(controls_enabled.then_some(DownloadMessage::DownloadPressed))
                .padding([10, 20]),
        );

        if let WorkflowState::Downloading { progress, .. } = workflow.state() {
            card = card.push(progress_bar(0.0..=1.0, *progress));
        }

        card.into()
    }
}
