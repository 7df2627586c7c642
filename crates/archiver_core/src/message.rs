//! Typed view of a processed message, as read back by the renderer.
//!
//! The rewriter works on untyped JSON and only substitutes strings, so these
//! structs mirror the upstream message shape. Every field is defaulted; an
//! unknown or partial message still deserializes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub author: User,
    pub content: String,
    pub timestamp: String,
    pub edited_timestamp: Option<String>,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
    pub reactions: Vec<Reaction>,
    pub sticker_items: Vec<StickerItem>,
    pub referenced_message: Option<Box<Message>>,
    pub pinned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    /// Local relative path after processing, `None` when absent or failed.
    pub avatar: Option<String>,
    pub bot: bool,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub url: String,
    pub content_type: Option<String>,
    pub spoiler: bool,
}

impl Attachment {
    pub fn is_spoiler(&self) -> bool {
        self.spoiler || self.filename.starts_with("SPOILER_")
    }

    pub fn media_kind(&self) -> MediaKind {
        let mime = self.content_type.as_deref().unwrap_or_default();
        if mime.starts_with("image/") {
            return MediaKind::Image;
        }
        if mime.starts_with("video/") {
            return MediaKind::Video;
        }
        if mime.starts_with("audio/") {
            return MediaKind::Audio;
        }
        MediaKind::from_path(&self.url)
            .or_else(|| MediaKind::from_path(&self.filename))
            .unwrap_or(MediaKind::Other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Other,
}

impl MediaKind {
    /// Guess from a path or URL extension; the query string is ignored.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "svg" => Some(MediaKind::Image),
            "mp4" | "webm" | "mov" | "mkv" => Some(MediaKind::Video),
            "mp3" | "ogg" | "wav" | "flac" | "m4a" => Some(MediaKind::Audio),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<u32>,
    pub author: Option<EmbedAuthor>,
    pub thumbnail: Option<EmbedMedia>,
    pub image: Option<EmbedMedia>,
    pub footer: Option<EmbedFooter>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reaction {
    pub count: u32,
    pub emoji: ReactionEmoji,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionEmoji {
    pub id: Option<String>,
    pub name: Option<String>,
    pub animated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickerItem {
    pub id: String,
    pub name: String,
}

/// Channel metadata needed to name and label an export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelInfo {
    pub id: String,
    pub name: Option<String>,
    pub guild_id: Option<String>,
}

impl ChannelInfo {
    /// DM channels have no name; fall back to the id.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("channel-{}", self.id))
    }
}
