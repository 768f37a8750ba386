mod api;
mod app;
mod application;
mod config;
mod domain;
mod ui;
mod utils;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};

fn main() -> iced::Result {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!("Starting Post Video Downloader");

    iced::application(app::DownloadApp::new, app::update, app::view)
        .title("Post Video Downloader")
        .window_size((720.0, 760.0))
        .run()
}
