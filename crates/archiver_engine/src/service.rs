use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use archiver_core::{ExportConfig, ExportLayout, JobId};
use archiver_logging::archiver_info;
use futures_util::FutureExt;
use tokio_util::task::TaskTracker;

use crate::api::{ApiClient, ApiSettings};
use crate::orchestrator::{record_failure, ExportPipeline, ExportRequest};
use crate::registry::JobRegistry;
use crate::render::{HtmlRenderer, Renderer};
use crate::types::ApiError;

/// Entry point for starting exports and observing them.
///
/// Every job runs on its own task that outlives the request which started
/// it. A panicking job is reported like any other failure.
pub struct ExportService {
    client: ApiClient,
    registry: Arc<JobRegistry>,
    pipeline: Arc<ExportPipeline>,
    tracker: TaskTracker,
}

impl ExportService {
    pub fn new(config: ExportConfig) -> Result<Self, ApiError> {
        let renderer = Arc::new(HtmlRenderer::new(config.messages_per_page));
        Self::with_renderer(config, renderer)
    }

    pub fn with_renderer(
        config: ExportConfig,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, ApiError> {
        let client = ApiClient::new(ApiSettings::with_base_url(config.api_base.clone()))?;
        let registry = Arc::new(JobRegistry::new());
        let pipeline = ExportPipeline::new(client.clone(), Arc::clone(&registry), renderer, config);
        Ok(Self::from_parts(client, registry, pipeline))
    }

    pub fn from_parts(client: ApiClient, registry: Arc<JobRegistry>, pipeline: ExportPipeline) -> Self {
        Self {
            client,
            registry,
            pipeline: Arc::new(pipeline),
            tracker: TaskTracker::new(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ExportConfig {
        self.pipeline.config()
    }

    /// Look the channel up with `token` and start exporting it.
    ///
    /// Lookup failures (bad token, missing access, unknown channel) are
    /// returned here; anything after that is reported through the registry.
    pub async fn start(
        &self,
        token: &str,
        guild_id: Option<String>,
        channel_id: &str,
    ) -> Result<JobId, ApiError> {
        let channel = self.client.get_channel(token, channel_id).await?;
        let request = ExportRequest::new(token, channel, guild_id);
        let layout = request.layout(&self.config().exports_dir);
        let job_id = request.job_id.clone();

        self.registry.begin(&job_id).await;
        self.tracker.spawn(supervise(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.registry),
            request,
            layout,
        ));
        archiver_info!("Export {} queued", job_id);
        Ok(job_id)
    }

    /// Export tasks still running.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait for running exports to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn supervise(
    pipeline: Arc<ExportPipeline>,
    registry: Arc<JobRegistry>,
    request: ExportRequest,
    layout: ExportLayout,
) {
    let outcome = AssertUnwindSafe(pipeline.run(&request, &layout))
        .catch_unwind()
        .await;
    if let Err(panic) = outcome {
        let message = format!("export task aborted: {}", panic_message(panic.as_ref()));
        record_failure(&registry, &request.job_id, Some(&layout), &message).await;
    }
    registry.finish(&request.job_id).await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
