//! Static HTML rendering of processed message batches.
mod markup;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use archiver_core::{Attachment, Embed, MediaKind, Message, Reaction};
use chrono::DateTime;
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

pub use markup::{escape_html, local_media, render_content};

const STYLESHEET: &str = include_str!("style.css");
const STYLESHEET_NAME: &str = "style.css";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("malformed batch file {file}: {message}")]
    MalformedBatch { file: String, message: String },
}

/// Everything a renderer needs to produce the archive pages.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub processed_dir: PathBuf,
    pub output_dir: PathBuf,
    pub channel_name: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOutput {
    pub pages: usize,
    pub messages: usize,
}

/// Turns processed batch files into browsable pages.
pub trait Renderer: Send + Sync {
    fn render(&self, job: &RenderJob) -> Result<RenderOutput, RenderError>;
}

/// Paginated, self-contained HTML pages styled after the chat client.
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    messages_per_page: usize,
}

impl HtmlRenderer {
    pub fn new(messages_per_page: usize) -> Self {
        Self {
            messages_per_page: messages_per_page.max(1),
        }
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new(500)
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, job: &RenderJob) -> Result<RenderOutput, RenderError> {
        let mut messages = load_processed_messages(&job.processed_dir)?;
        // Batches arrive newest first; pages read oldest first.
        messages.reverse();

        let writer = AtomicFileWriter::new(job.output_dir.clone());
        writer.write(STYLESHEET_NAME, STYLESHEET)?;

        // An empty export still gets an index page.
        let chunks: Vec<&[Message]> = if messages.is_empty() {
            vec![&messages[..]]
        } else {
            messages.chunks(self.messages_per_page).collect()
        };
        let total_pages = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            let page = index + 1;
            let html = render_page(job, chunk, page, total_pages, messages.len());
            writer.write(&page_file_name(page), &html)?;
        }

        Ok(RenderOutput {
            pages: total_pages,
            messages: messages.len(),
        })
    }
}

pub fn page_file_name(page: usize) -> String {
    if page <= 1 {
        "index.html".to_string()
    } else {
        format!("page_{page}.html")
    }
}

/// All messages from `*.json` batch files, in file-name order.
pub fn load_processed_messages(dir: &Path) -> Result<Vec<Message>, RenderError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut messages = Vec::new();
    for entry in entries {
        let content = fs::read_to_string(entry.path())?;
        let batch: Vec<Message> =
            serde_json::from_str(&content).map_err(|err| RenderError::MalformedBatch {
                file: entry.file_name().to_string_lossy().into_owned(),
                message: err.to_string(),
            })?;
        messages.extend(batch);
    }
    Ok(messages)
}

fn render_page(
    job: &RenderJob,
    messages: &[Message],
    page: usize,
    total_pages: usize,
    total_messages: usize,
) -> String {
    let title = escape_html(&job.channel_name);
    let mut body = String::new();
    if messages.is_empty() {
        body.push_str(r#"<p class="empty">This channel has no messages.</p>"#);
    }
    for message in messages {
        body.push_str(&render_message(message));
    }
    let nav = render_nav(page, total_pages);
    let guild = job
        .guild_id
        .as_deref()
        .map(|g| format!(" &middot; server {}", escape_html(g)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>#{title} &middot; page {page}</title>
<link rel="stylesheet" href="{STYLESHEET_NAME}">
</head>
<body>
<header class="channel-header">
<h1>#{title}</h1>
<p class="channel-meta">channel {channel_id}{guild} &middot; {total_messages} messages</p>
</header>
{nav}
<main class="messages">
{body}
</main>
{nav}
</body>
</html>
"#,
        channel_id = escape_html(&job.channel_id),
    )
}

fn render_nav(page: usize, total_pages: usize) -> String {
    if total_pages <= 1 {
        return String::new();
    }
    let prev = if page > 1 {
        format!(r#"<a href="{}">&larr; Older</a>"#, page_file_name(page - 1))
    } else {
        String::new()
    };
    let next = if page < total_pages {
        format!(r#"<a href="{}">Newer &rarr;</a>"#, page_file_name(page + 1))
    } else {
        String::new()
    };
    format!(r#"<nav class="pager">{prev}<span>Page {page} of {total_pages}</span>{next}</nav>"#)
}

fn render_message(message: &Message) -> String {
    let author = &message.author;
    let name = escape_html(author.display_name());
    let avatar = match author.avatar.as_deref() {
        Some(path) if !path.is_empty() => {
            format!(r#"<img class="avatar" src="{}" alt="">"#, escape_html(path))
        }
        _ => {
            let initial = author
                .display_name()
                .chars()
                .next()
                .map(|c| escape_html(&c.to_uppercase().to_string()))
                .unwrap_or_default();
            format!(r#"<div class="avatar placeholder">{initial}</div>"#)
        }
    };
    let bot = if author.bot {
        r#"<span class="bot-tag">BOT</span>"#
    } else {
        ""
    };
    let edited = if message.edited_timestamp.is_some() {
        r#"<span class="edited">(edited)</span>"#
    } else {
        ""
    };
    let reply = message
        .referenced_message
        .as_deref()
        .map(render_reply)
        .unwrap_or_default();

    let mut extras = String::new();
    for attachment in &message.attachments {
        extras.push_str(&render_attachment(attachment));
    }
    for embed in &message.embeds {
        extras.push_str(&render_embed(embed));
    }
    for sticker in &message.sticker_items {
        extras.push_str(&format!(
            r#"<div class="sticker">Sticker: {}</div>"#,
            escape_html(&sticker.name)
        ));
    }
    if !message.reactions.is_empty() {
        extras.push_str(r#"<div class="reactions">"#);
        for reaction in &message.reactions {
            extras.push_str(&render_reaction(reaction));
        }
        extras.push_str("</div>");
    }

    format!(
        r#"<article class="message" id="msg-{id}">
{avatar}
<div class="message-body">
{reply}<div class="message-header"><span class="author">{name}</span>{bot}<time class="timestamp" datetime="{ts_raw}">{ts}</time>{edited}</div>
<div class="content">{content}</div>
{extras}</div>
</article>
"#,
        id = escape_html(&message.id),
        ts_raw = escape_html(&message.timestamp),
        ts = format_timestamp(&message.timestamp),
        content = render_content(&message.content),
    )
}

fn render_reply(reply: &Message) -> String {
    let mut snippet: String = reply.content.chars().take(120).collect();
    if reply.content.chars().count() > 120 {
        snippet.push('…');
    }
    format!(
        r##"<div class="reply"><a href="#msg-{id}">&#8627; <span class="author">{name}</span></a> {snippet}</div>
"##,
        id = escape_html(&reply.id),
        name = escape_html(reply.author.display_name()),
        snippet = escape_html(&snippet),
    )
}

fn render_attachment(attachment: &Attachment) -> String {
    let url = escape_html(&attachment.url);
    let inner = match attachment.media_kind() {
        MediaKind::Image => format!(
            r#"<a href="{url}" target="_blank"><img src="{url}" alt="{name}" loading="lazy"></a>"#,
            name = escape_html(&attachment.filename)
        ),
        MediaKind::Video => format!(r#"<video src="{url}" controls preload="metadata"></video>"#),
        MediaKind::Audio => format!(r#"<audio src="{url}" controls preload="none"></audio>"#),
        MediaKind::Other => format!(
            r#"<a class="file" href="{url}" target="_blank">{name}</a> <span class="size">{size}</span>"#,
            name = escape_html(&attachment.filename),
            size = format_size(attachment.size)
        ),
    };
    let class = if attachment.is_spoiler() {
        "attachment spoiler"
    } else {
        "attachment"
    };
    format!(r#"<div class="{class}">{inner}</div>"#)
}

fn render_embed(embed: &Embed) -> String {
    let mut html = String::new();
    let border = embed
        .color
        .map(|c| format!(r#" style="border-left-color:#{c:06x}""#))
        .unwrap_or_default();
    html.push_str(&format!(r#"<div class="embed"{border}>"#));
    if let Some(author) = &embed.author {
        html.push_str(&format!(
            r#"<div class="embed-author">{}</div>"#,
            escape_html(&author.name)
        ));
    }
    if let Some(title) = &embed.title {
        let title = escape_html(title);
        match &embed.url {
            Some(url) => html.push_str(&format!(
                r#"<div class="embed-title"><a href="{}" target="_blank">{title}</a></div>"#,
                escape_html(url)
            )),
            None => html.push_str(&format!(r#"<div class="embed-title">{title}</div>"#)),
        }
    }
    if let Some(description) = &embed.description {
        html.push_str(&format!(
            r#"<div class="embed-description">{}</div>"#,
            render_content(description)
        ));
    }
    for field in &embed.fields {
        html.push_str(&format!(
            r#"<div class="embed-field"><div class="embed-field-name">{}</div><div>{}</div></div>"#,
            escape_html(&field.name),
            render_content(&field.value)
        ));
    }
    if let Some(image) = embed.image.as_ref().or(embed.thumbnail.as_ref()) {
        if !image.url.is_empty() {
            html.push_str(&local_media(&escape_html(&image.url), "embed-image"));
        }
    }
    if let Some(footer) = &embed.footer {
        html.push_str(&format!(
            r#"<div class="embed-footer">{}</div>"#,
            escape_html(&footer.text)
        ));
    }
    html.push_str("</div>");
    html
}

fn render_reaction(reaction: &Reaction) -> String {
    let emoji = &reaction.emoji;
    let label = match (&emoji.id, &emoji.name) {
        (Some(_), Some(name)) => format!(":{name}:"),
        (None, Some(name)) => name.clone(),
        _ => "?".to_string(),
    };
    format!(
        r#"<span class="reaction">{} {}</span>"#,
        escape_html(&label),
        reaction.count
    )
}

fn format_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| escape_html(raw))
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_is_index() {
        assert_eq!(page_file_name(1), "index.html");
        assert_eq!(page_file_name(3), "page_3.html");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn timestamps_are_shortened() {
        assert_eq!(
            format_timestamp("2024-03-01T10:15:30.123000+00:00"),
            "2024-03-01 10:15"
        );
        assert_eq!(format_timestamp("<bad>"), "&lt;bad&gt;");
    }
}
