use std::sync::LazyLock;

use archiver_core::MediaKind;
use regex::{Captures, Regex};

use crate::rewrite::EMOTE_MARKER_PREFIX;

static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"(?P<emote>{}(?P<epath>[^\s|]+)\|:(?P<ename>[A-Za-z0-9_]*):)|(?P<url>https?://[^\s<]+)|(?P<local>downloaded_files/[A-Za-z0-9_./-]+)|(?P<mention>&lt;(?P<sigil>@!|@&amp;|@|#)(?P<mid>\d+)&gt;)",
        regex::escape(EMOTE_MARKER_PREFIX)
    );
    Regex::new(&pattern).expect("valid inline markup regex")
});

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Message text to HTML: escaped, with emote markers, links, local media
/// and mentions expanded, and line breaks kept.
pub fn render_content(text: &str) -> String {
    let escaped = escape_html(text);
    let expanded = INLINE_RE.replace_all(&escaped, |caps: &Captures| {
        if caps.name("emote").is_some() {
            let alt = format!(":{}:", &caps["ename"]);
            return format!(
                r#"<img class="emote" src="{}" alt="{alt}" title="{alt}">"#,
                &caps["epath"]
            );
        }
        if let Some(url) = caps.name("url") {
            let url = url.as_str();
            return format!(r#"<a href="{url}" target="_blank" rel="noopener">{url}</a>"#);
        }
        if let Some(local) = caps.name("local") {
            return local_media(local.as_str(), "inline-media");
        }
        let sigil = match &caps["sigil"] {
            "#" => "#",
            "@&amp;" => "@&amp;",
            _ => "@",
        };
        format!(r#"<span class="mention">{sigil}{}</span>"#, &caps["mid"])
    });
    expanded.replace('\n', "<br>")
}

/// Inline element for a local or remote media path.
pub fn local_media(path: &str, class: &str) -> String {
    match MediaKind::from_path(path) {
        Some(MediaKind::Image) => format!(
            r#"<a href="{path}" target="_blank"><img class="{class}" src="{path}" alt="" loading="lazy"></a>"#
        ),
        Some(MediaKind::Video) => format!(r#"<video class="{class}" src="{path}" controls preload="metadata"></video>"#),
        Some(MediaKind::Audio) => format!(r#"<audio src="{path}" controls preload="none"></audio>"#),
        Some(MediaKind::Other) | None => {
            format!(r#"<a href="{path}" target="_blank">{path}</a>"#)
        }
    }
}
