//! Archiver engine: API access, downloads, rewriting and export runs.
mod api;
mod download;
mod messages;
mod orchestrator;
mod persist;
mod registry;
mod render;
mod rewrite;
mod service;
mod types;

pub use api::{ApiClient, ApiSettings};
pub use download::{resolve_extension, AssetDownloader, AssetResolver, DownloadSettings, UNKNOWN_EXTENSION};
pub use messages::{next_cursor, MessageBatch, MessageFetcher};
pub use orchestrator::{move_assets, record_failure, ExportPipeline, ExportRequest};
pub use persist::{create_fresh_dir, ensure_output_dir, AtomicFileWriter, PersistError};
pub use registry::{JobRegistry, UpdateReceiver, UpdateSender};
pub use render::{
    escape_html, load_processed_messages, local_media, page_file_name, render_content,
    HtmlRenderer, RenderError, RenderJob, RenderOutput, Renderer,
};
pub use rewrite::{
    emote_marker, is_downloadable_media, ContentRewriter, CIRCULAR_REFERENCE_MARKER,
    EMOTE_MARKER_PREFIX, MAX_DEPTH, MIN_AVATAR_HASH_LEN,
};
pub use service::ExportService;
pub use types::{ApiBody, ApiError, DownloadError, DownloadFailure, PipelineError};
