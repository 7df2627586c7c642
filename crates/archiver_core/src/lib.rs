//! Archiver core: IO-free domain types for channel exports.
mod config;
mod job;
mod layout;
mod message;
mod update;

pub use config::{ConfigError, ExportConfig, MAX_BATCH_SIZE};
pub use job::{
    format_duration, DownloadCounters, ExportSummary, JobId, JobState, TransitionError,
};
pub use layout::{
    batch_file_name, export_dir_name, sanitize_name, AssetCategory, ExportLayout, DOWNLOADS_DIR,
    FAILURE_MARKER, HTML_DIR, MOVE_WARNING_MARKER, PROCESSED_MESSAGES_DIR, RAW_MESSAGES_DIR,
    SUCCESS_MARKER,
};
pub use message::{
    Attachment, ChannelInfo, Embed, EmbedAuthor, EmbedField, EmbedFooter, EmbedMedia, MediaKind,
    Message, Reaction, ReactionEmoji, StickerItem, User,
};
pub use update::{JobUpdate, UpdateStatus};
