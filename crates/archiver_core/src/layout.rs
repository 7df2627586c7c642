use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

pub const RAW_MESSAGES_DIR: &str = "messages";
pub const PROCESSED_MESSAGES_DIR: &str = "processed_messages";
pub const HTML_DIR: &str = "processed_html";
pub const DOWNLOADS_DIR: &str = "downloaded_files";

pub const SUCCESS_MARKER: &str = "EXPORT_SUCCESS.txt";
pub const FAILURE_MARKER: &str = "EXPORT_FAILED.txt";
pub const MOVE_WARNING_MARKER: &str = "EXPORT_WARNING_MOVE_FAILED.txt";

const MAX_NAME_LEN: usize = 80;

/// Asset category; each maps to one subdirectory of `downloaded_files/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    Avatars,
    Emotes,
    Attachments,
}

impl AssetCategory {
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetCategory::Avatars => "avatars",
            AssetCategory::Emotes => "emotes",
            AssetCategory::Attachments => "attachments",
        }
    }

    /// Path of the category directory relative to an export root, using `/`.
    pub fn relative_dir(self) -> String {
        format!("{DOWNLOADS_DIR}/{}", self.dir_name())
    }
}

/// Paths of a single export run:
///
/// ```text
/// <ChannelName>_<ChannelId>_<Timestamp>/
///   messages/  processed_messages/  processed_html/  downloaded_files/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout for a fresh run under `exports_dir`.
    pub fn for_run(
        exports_dir: &Path,
        channel_name: &str,
        channel_id: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::new(exports_dir.join(export_dir_name(channel_name, channel_id, started_at)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_messages_dir(&self) -> PathBuf {
        self.root.join(RAW_MESSAGES_DIR)
    }

    pub fn processed_messages_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_MESSAGES_DIR)
    }

    pub fn html_dir(&self) -> PathBuf {
        self.root.join(HTML_DIR)
    }

    /// Working asset directory the downloader writes into.
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    /// Where the rendered pages expect the assets to live.
    pub fn html_downloads_dir(&self) -> PathBuf {
        self.html_dir().join(DOWNLOADS_DIR)
    }

    pub fn category_dir(&self, category: AssetCategory) -> PathBuf {
        self.downloads_dir().join(category.dir_name())
    }
}

/// File name of the n-th batch (1-based), so lexical order is batch order.
pub fn batch_file_name(batch_index: u32) -> String {
    format!("batch_{batch_index:05}.json")
}

/// Run directory name. The stamp has millisecond precision, the same instant
/// the job id is derived from, so distinct jobs never share a directory.
pub fn export_dir_name(channel_name: &str, channel_id: &str, started_at: DateTime<Utc>) -> String {
    let name = sanitize_name(channel_name);
    let id = sanitize_name(channel_id);
    let stamp = started_at.format("%Y%m%d_%H%M%S_%3f");
    format!("{name}_{id}_{stamp}")
}

/// Windows-safe directory component: forbidden characters become `_`,
/// runs of `_` collapse, length is capped and reserved device names patched.
pub fn sanitize_name(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        return "channel".to_string();
    }

    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }

    let mut final_name: String = compacted.chars().take(MAX_NAME_LEN).collect();
    if is_reserved_windows_name(&final_name) {
        final_name.push('_');
    }
    final_name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}
