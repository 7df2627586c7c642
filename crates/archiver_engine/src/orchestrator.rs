//! Sequencing of one export run: fetch, rewrite, persist, render, finalize.
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use archiver_core::{
    batch_file_name, format_duration, ChannelInfo, ExportConfig, ExportLayout, ExportSummary,
    JobId, JobState, JobUpdate, FAILURE_MARKER, MOVE_WARNING_MARKER, SUCCESS_MARKER,
};
use archiver_logging::{archiver_debug, archiver_error, archiver_info, archiver_warn};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::api::ApiClient;
use crate::download::{AssetDownloader, DownloadSettings};
use crate::messages::{next_cursor, MessageBatch, MessageFetcher};
use crate::persist::{create_fresh_dir, ensure_output_dir, AtomicFileWriter, PersistError};
use crate::registry::JobRegistry;
use crate::render::{RenderJob, Renderer};
use crate::rewrite::ContentRewriter;
use crate::types::{ApiError, PipelineError};

/// One requested export, resolved against the channel lookup.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub job_id: JobId,
    pub token: String,
    pub channel: ChannelInfo,
    pub guild_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ExportRequest {
    pub fn new(token: impl Into<String>, channel: ChannelInfo, guild_id: Option<String>) -> Self {
        let started_at = Utc::now();
        let guild_id = guild_id
            .filter(|g| !g.is_empty())
            .or_else(|| channel.guild_id.clone());
        Self {
            job_id: JobId::new(&channel.id, started_at),
            token: token.into(),
            channel,
            guild_id,
            started_at,
        }
    }

    pub fn layout(&self, exports_dir: &Path) -> ExportLayout {
        ExportLayout::for_run(
            exports_dir,
            &self.channel.display_name(),
            &self.channel.id,
            self.started_at,
        )
    }
}

/// Drives export runs and reports their progress to the registry.
pub struct ExportPipeline {
    fetcher: MessageFetcher,
    registry: Arc<JobRegistry>,
    renderer: Arc<dyn Renderer>,
    config: ExportConfig,
    download: DownloadSettings,
}

impl ExportPipeline {
    pub fn new(
        client: ApiClient,
        registry: Arc<JobRegistry>,
        renderer: Arc<dyn Renderer>,
        config: ExportConfig,
    ) -> Self {
        Self {
            fetcher: MessageFetcher::new(client),
            registry,
            renderer,
            config,
            download: DownloadSettings::default(),
        }
    }

    pub fn with_download_settings(mut self, download: DownloadSettings) -> Self {
        self.download = download;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run the export to completion and return its terminal state.
    ///
    /// Failures are written to the failure marker and published as an
    /// `error` update; they are not returned.
    pub async fn run(&self, request: &ExportRequest, layout: &ExportLayout) -> JobState {
        let mut state = JobState::Starting;
        archiver_info!(
            "Export {} starting channel={} root={}",
            request.job_id,
            request.channel.id,
            layout.root().display()
        );

        match self.execute(request, layout, &mut state).await {
            Ok(summary) => {
                archiver_info!(
                    "Export {} succeeded batches={} messages={} downloads={}",
                    request.job_id,
                    summary.batches,
                    summary.messages,
                    summary.downloads.downloaded
                );
                state
            }
            Err(err) => {
                let failed_in = state;
                let _ = state.advance(JobState::Failed);
                // Another run owns an existing directory; leave it alone.
                let marker_layout = match &err {
                    PipelineError::Directory(PersistError::AlreadyExists(_)) => None,
                    _ => Some(layout),
                };
                record_failure(
                    &self.registry,
                    &request.job_id,
                    marker_layout,
                    &format!("{err} (while {failed_in})"),
                )
                .await;
                state
            }
        }
    }

    async fn execute(
        &self,
        request: &ExportRequest,
        layout: &ExportLayout,
        state: &mut JobState,
    ) -> Result<ExportSummary, PipelineError> {
        let started = Instant::now();
        let job_id = &request.job_id;
        let channel_name = request.channel.display_name();

        create_fresh_dir(layout.root()).map_err(PipelineError::Directory)?;
        ensure_output_dir(&layout.raw_messages_dir()).map_err(PipelineError::Directory)?;
        ensure_output_dir(&layout.processed_messages_dir()).map_err(PipelineError::Directory)?;
        self.publish(
            job_id,
            JobUpdate::starting(format!("Starting export of #{channel_name}")),
        )
        .await;

        state.advance(JobState::Fetching)?;
        let mut downloader = AssetDownloader::new(
            self.fetcher.client().http().clone(),
            layout.root().to_path_buf(),
            self.download.clone(),
        );
        let rewriter = ContentRewriter::new(self.config.cdn_base.clone());
        let raw_writer = AtomicFileWriter::new(layout.raw_messages_dir());
        let processed_writer = AtomicFileWriter::new(layout.processed_messages_dir());

        let mut cursor: Option<String> = None;
        let mut batches: u32 = 0;
        let mut messages: u64 = 0;
        let mut stopped_at_batch_limit = false;

        loop {
            if self.config.max_batches.is_some_and(|limit| batches >= limit) {
                stopped_at_batch_limit = true;
                archiver_info!("Export {} reached the batch limit of {}", job_id, batches);
                self.publish(
                    job_id,
                    JobUpdate::warning(format!(
                        "Stopping after {batches} batches (configured limit)"
                    ))
                    .with_batch(batches),
                )
                .await;
                break;
            }

            let batch_index = batches + 1;
            let batch = self
                .fetch_with_retry(request, cursor.as_deref(), batch_index)
                .await?;
            if batch.is_empty() {
                archiver_debug!("Export {} history exhausted at batch {}", job_id, batch_index);
                break;
            }

            state.advance(JobState::Processing)?;
            let count = batch.len() as u64;
            let next = next_cursor(&batch);
            let file_name = batch_file_name(batch_index);
            raw_writer
                .write_json(&file_name, &batch)
                .map_err(|source| PipelineError::Persist {
                    batch: batch_index,
                    source,
                })?;

            let processed = rewriter.rewrite(Value::Array(batch), &mut downloader).await;
            processed_writer
                .write_json(&file_name, &processed)
                .map_err(|source| PipelineError::Persist {
                    batch: batch_index,
                    source,
                })?;

            batches = batch_index;
            messages += count;
            self.publish(
                job_id,
                JobUpdate::progress(
                    format!("Processed batch {batches}: {count} messages ({messages} total)"),
                    batches,
                ),
            )
            .await;

            state.advance(JobState::Fetching)?;
            cursor = next;
            if cursor.is_none() {
                archiver_warn!("Export {} batch {} has no message id to page from", job_id, batches);
                break;
            }
            tokio::time::sleep(self.config.batch_delay).await;
        }

        state.advance(JobState::Rendering)?;
        self.publish(
            job_id,
            JobUpdate::progress(format!("Rendering {messages} messages"), batches),
        )
        .await;
        let render_job = RenderJob {
            processed_dir: layout.processed_messages_dir(),
            output_dir: layout.html_dir(),
            channel_name: channel_name.clone(),
            channel_id: request.channel.id.clone(),
            guild_id: request.guild_id.clone(),
        };
        let renderer = Arc::clone(&self.renderer);
        let output = tokio::task::spawn_blocking(move || renderer.render(&render_job))
            .await
            .map_err(|err| PipelineError::Panicked(err.to_string()))??;
        archiver_debug!("Export {} rendered {} pages", job_id, output.pages);

        state.advance(JobState::MovingAssets)?;
        if let Err(err) = move_assets(layout).await {
            let message = format!("Downloaded files could not be moved next to the pages: {err}");
            archiver_warn!("Export {}: {}", job_id, message);
            if let Err(marker_err) =
                AtomicFileWriter::new(layout.root().to_path_buf()).write(MOVE_WARNING_MARKER, &message)
            {
                archiver_error!("Export {}: could not write warning marker: {}", job_id, marker_err);
            }
            self.publish(job_id, JobUpdate::warning(message)).await;
        }

        state.advance(JobState::Finalizing)?;
        let summary = ExportSummary {
            channel_name,
            channel_id: request.channel.id.clone(),
            batches,
            messages,
            duration: started.elapsed(),
            downloads: downloader.counters(),
            stopped_at_batch_limit,
        };
        let text = summary.to_text();
        AtomicFileWriter::new(layout.root().to_path_buf())
            .write(SUCCESS_MARKER, &text)
            .map_err(PipelineError::Marker)?;

        state.advance(JobState::Succeeded)?;
        self.publish(
            job_id,
            JobUpdate::complete(
                format!(
                    "Export complete: {messages} messages in {}",
                    format_duration(summary.duration)
                ),
                text,
            )
            .with_batch(batches),
        )
        .await;
        Ok(summary)
    }

    /// Fetch one batch, retrying once after the configured delay.
    ///
    /// Credential and missing-channel errors are not retried.
    async fn fetch_with_retry(
        &self,
        request: &ExportRequest,
        before: Option<&str>,
        batch: u32,
    ) -> Result<MessageBatch, PipelineError> {
        let first = match self.fetch_once(request, before).await {
            Ok(messages) => return Ok(messages),
            Err(err) => err,
        };
        if first.is_auth() || matches!(first, ApiError::NotFound(_)) {
            return Err(PipelineError::Fetch {
                batch,
                source: first,
            });
        }

        archiver_warn!(
            "Batch fetch failed job_id={} batch={} transient={} retry_in_ms={}: {}",
            request.job_id,
            batch,
            first.is_transient(),
            self.config.retry_delay.as_millis(),
            first
        );
        self.publish(
            &request.job_id,
            JobUpdate::warning(format!(
                "Fetching batch {batch} failed ({first}); retrying in {}",
                format_duration(self.config.retry_delay)
            ))
            .with_batch(batch),
        )
        .await;
        tokio::time::sleep(self.config.retry_delay).await;

        self.fetch_once(request, before)
            .await
            .map_err(|source| PipelineError::Fetch { batch, source })
    }

    async fn fetch_once(
        &self,
        request: &ExportRequest,
        before: Option<&str>,
    ) -> Result<MessageBatch, ApiError> {
        self.fetcher
            .fetch_batch(
                &request.token,
                &request.channel.id,
                self.config.batch_size,
                before,
            )
            .await
    }

    async fn publish(&self, job_id: &JobId, update: JobUpdate) {
        self.registry.publish(job_id, update).await;
    }
}

/// Move the downloader's working directory under the rendered pages.
///
/// Returns `false` when nothing was downloaded.
pub async fn move_assets(layout: &ExportLayout) -> io::Result<bool> {
    let from = layout.downloads_dir();
    if !tokio::fs::try_exists(&from).await? {
        return Ok(false);
    }
    let to = layout.html_downloads_dir();
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&from, &to).await?;
    Ok(true)
}

/// Terminal failure bookkeeping: log, write the failure marker when a run
/// directory is known, and publish an `error` update.
pub async fn record_failure(
    registry: &JobRegistry,
    job_id: &JobId,
    layout: Option<&ExportLayout>,
    message: &str,
) {
    archiver_error!("Export {} failed: {}", job_id, message);
    if let Some(layout) = layout {
        let text = format!(
            "Export {job_id} failed at {}.\nError: {message}\n",
            Utc::now().to_rfc3339()
        );
        if let Err(err) = AtomicFileWriter::new(layout.root().to_path_buf()).write(FAILURE_MARKER, &text)
        {
            archiver_error!("Export {}: could not write failure marker: {}", job_id, err);
        }
    }
    registry
        .publish(job_id, JobUpdate::error(format!("Export failed: {message}")))
        .await;
}
