// bases/download_cli/src/app.rs
use crate::config::Config;
use crate::notify::TermuxNotifier;
use crate::output::OutputHandler;
use color_eyre::Result;
use media_downloader::{
    BroadcastSink, EventSink, Fanout, JsonPlaylistSource, MediaDownloader, MetadataSource, PlaylistSummary,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

const EVENT_BUFFER: usize = 256;

pub struct App {
    config: Config,
    output: OutputHandler,
}

impl App {
    pub fn new(config: Config) -> Self {
        let output = OutputHandler::new(config.verbose);
        Self { config, output }
    }

    pub async fn run(&self) -> Result<PlaylistSummary> {
        let source = JsonPlaylistSource::new(&self.config.playlist_dir);
        let playlist = source.playlist(&self.config.playlist_id).await?;

        let titles: HashMap<String, String> = playlist
            .tracks
            .iter()
            .map(|t| (t.id.clone(), t.title.clone()))
            .collect();
        let output = self.output.clone().with_titles(titles.clone());

        let (progress, mut events) = BroadcastSink::new(EVENT_BUFFER);
        let mut sink = Fanout::new().with(Arc::new(progress));
        if let Some(notifier) = TermuxNotifier::detect(titles) {
            tracing::info!("posting notifications through termux-notification");
            sink = sink.with(Arc::new(notifier));
        }
        let sink: Arc<dyn EventSink> = Arc::new(sink);

        let printer_output = output.clone();
        let printer = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => printer_output.print_event(&event),
                    Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "progress output fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let downloader = MediaDownloader::new(self.config.downloader.clone(), sink).await?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling downloads");
                on_interrupt.cancel();
            }
        });

        output.print_playlist_start(
            &playlist.name,
            playlist.tracks.len(),
            &self.config.downloader.destination_dir,
        );
        let results = downloader.download(playlist.tracks, &cancel).await;

        // Closing the channel lets the printer drain and stop
        drop(downloader);
        let _ = printer.await;

        let summary = PlaylistSummary::from_results(&results);
        output.print_summary(&results, &summary);
        Ok(summary)
    }

    pub fn print_error(&self, error: &color_eyre::Report) {
        self.output.print_error(error);
    }
}
