use std::sync::LazyLock;

use archiver_core::AssetCategory;
use archiver_logging::archiver_debug;
use futures_util::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::download::AssetResolver;

/// Substituted for any subtree nested deeper than [`MAX_DEPTH`].
pub const CIRCULAR_REFERENCE_MARKER: &str = "[Circular Reference]";
/// Starts an emote marker token: `<prefix><relative path>|:<name>:`.
pub const EMOTE_MARKER_PREFIX: &str = "@@LOCAL_EMOTE@@";
/// Shorter avatar values cannot be real hashes.
pub const MIN_AVATAR_HASH_LEN: usize = 16;
pub const MAX_DEPTH: usize = 128;

const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "mp4", "webm", "mov", "mkv", "mp3", "ogg",
    "wav", "flac", "m4a", "pdf", "txt", "zip",
];

/// Animated GIF hosts whose links stay remote.
const EXEMPT_HOSTS: &[&str] = &["tenor.com", "giphy.com"];

static EMOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(a?):([A-Za-z0-9_~]{1,64}):(\d{5,25})>").expect("valid emote regex")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`]+"#).expect("valid url regex"));

/// Pending substitution inside one string.
struct Replacement {
    start: usize,
    end: usize,
    text: String,
}

/// Rewrites message JSON so that remote media points at local files.
///
/// Resolution is sequential: each URL is awaited before the next one is
/// looked at, so the resolver's cache sees every URL in order.
#[derive(Debug, Clone)]
pub struct ContentRewriter {
    cdn_base: String,
}

impl ContentRewriter {
    pub fn new(cdn_base: impl Into<String>) -> Self {
        Self {
            cdn_base: cdn_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Rewrite any JSON value; never fails. Unresolvable references are left
    /// as they were.
    pub async fn rewrite<R>(&self, data: Value, resolver: &mut R) -> Value
    where
        R: AssetResolver + ?Sized,
    {
        self.rewrite_node(data, resolver, 0).await
    }

    fn rewrite_node<'a, R>(
        &'a self,
        value: Value,
        resolver: &'a mut R,
        depth: usize,
    ) -> BoxFuture<'a, Value>
    where
        R: AssetResolver + ?Sized,
    {
        async move {
            if depth > MAX_DEPTH {
                return Value::String(CIRCULAR_REFERENCE_MARKER.to_string());
            }
            match value {
                Value::String(text) => Value::String(self.rewrite_text(text, resolver).await),
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.rewrite_node(item, &mut *resolver, depth + 1).await);
                    }
                    Value::Array(out)
                }
                Value::Object(mut map) => {
                    let user_shaped = is_user_shaped(&map);
                    if user_shaped {
                        self.rewrite_avatar(&mut map, resolver).await;
                    }
                    let mut out = Map::with_capacity(map.len());
                    for (key, child) in map {
                        let child = if user_shaped && key == "avatar" {
                            child
                        } else {
                            self.rewrite_node(child, &mut *resolver, depth + 1).await
                        };
                        out.insert(key, child);
                    }
                    Value::Object(out)
                }
                primitive => primitive,
            }
        }
        .boxed()
    }

    /// Replace the avatar hash with a local path, or `null`.
    async fn rewrite_avatar<R>(&self, user: &mut Map<String, Value>, resolver: &mut R)
    where
        R: AssetResolver + ?Sized,
    {
        let user_id = user.get("id").and_then(Value::as_str).unwrap_or_default();
        let local = match user.get("avatar").and_then(Value::as_str) {
            Some(hash) if hash.len() >= MIN_AVATAR_HASH_LEN => {
                let (url, ext) = self.avatar_url(user_id, hash);
                match resolver.resolve(&url, AssetCategory::Avatars, Some(ext)).await {
                    Ok(path) => Value::String(path),
                    Err(err) => {
                        archiver_debug!("Avatar dropped user={} cause={}", user_id, err.cause);
                        Value::Null
                    }
                }
            }
            _ => Value::Null,
        };
        user.insert("avatar".to_string(), local);
    }

    fn avatar_url(&self, user_id: &str, hash: &str) -> (String, &'static str) {
        let ext = if hash.starts_with("a_") { "gif" } else { "png" };
        (
            format!("{}/avatars/{user_id}/{hash}.{ext}?size=128", self.cdn_base),
            ext,
        )
    }

    fn emote_url(&self, id: &str, animated: bool) -> (String, &'static str) {
        let ext = if animated { "gif" } else { "png" };
        (format!("{}/emojis/{id}.{ext}", self.cdn_base), ext)
    }

    /// Rewrite emote markup and media URLs inside one string.
    async fn rewrite_text<R>(&self, text: String, resolver: &mut R) -> String
    where
        R: AssetResolver + ?Sized,
    {
        let text = if EMOTE_RE.is_match(&text) {
            self.rewrite_emotes(&text, resolver).await
        } else {
            text
        };
        if text.contains("http") {
            self.rewrite_urls(&text, resolver).await
        } else {
            text
        }
    }

    async fn rewrite_emotes<R>(&self, text: &str, resolver: &mut R) -> String
    where
        R: AssetResolver + ?Sized,
    {
        let found: Vec<(usize, usize, bool, String, String)> = EMOTE_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((
                    whole.start(),
                    whole.end(),
                    !caps[1].is_empty(),
                    caps[2].to_string(),
                    caps[3].to_string(),
                ))
            })
            .collect();

        let mut replacements = Vec::with_capacity(found.len());
        for (start, end, animated, name, id) in found {
            let (url, ext) = self.emote_url(&id, animated);
            if let Ok(path) = resolver.resolve(&url, AssetCategory::Emotes, Some(ext)).await {
                replacements.push(Replacement {
                    start,
                    end,
                    text: emote_marker(&path, &name),
                });
            }
        }
        splice(text, replacements)
    }

    async fn rewrite_urls<R>(&self, text: &str, resolver: &mut R) -> String
    where
        R: AssetResolver + ?Sized,
    {
        let found: Vec<(usize, usize)> = URL_RE
            .find_iter(text)
            .map(|m| {
                let trimmed = trim_url_tail(m.as_str());
                (m.start(), m.start() + trimmed.len())
            })
            .filter(|(start, end)| is_downloadable_media(&text[*start..*end]))
            .collect();

        let mut replacements = Vec::with_capacity(found.len());
        for (start, end) in found {
            let url = &text[start..end];
            if let Ok(path) = resolver.resolve(url, AssetCategory::Attachments, None).await {
                replacements.push(Replacement {
                    start,
                    end,
                    text: path,
                });
            }
        }
        splice(text, replacements)
    }
}

fn is_user_shaped(map: &Map<String, Value>) -> bool {
    map.get("id").is_some_and(Value::is_string)
        && map.get("username").is_some_and(Value::is_string)
        && map.contains_key("avatar")
}

pub fn emote_marker(path: &str, name: &str) -> String {
    let alt: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    format!("{EMOTE_MARKER_PREFIX}{path}|:{alt}:")
}

/// Sentence punctuation directly after a URL is not part of it.
fn trim_url_tail(raw: &str) -> &str {
    raw.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '*', '_', '~', '|'])
}

/// True for http(s) URLs whose path ends in a known media extension and
/// whose host is not an exempt GIF service.
pub fn is_downloadable_media(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    if EXEMPT_HOSTS
        .iter()
        .any(|exempt| host == *exempt || host.ends_with(&format!(".{exempt}")))
    {
        return false;
    }
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

fn splice(text: &str, replacements: Vec<Replacement>) -> String {
    if replacements.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for replacement in replacements {
        out.push_str(&text[cursor..replacement.start]);
        out.push_str(&replacement.text);
        cursor = replacement.end;
    }
    out.push_str(&text[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_detection_checks_extension_and_host() {
        assert!(is_downloadable_media("https://cdn.discordapp.com/attachments/1/2/cat.PNG?ex=1"));
        assert!(!is_downloadable_media("https://example.com/page.html"));
        assert!(!is_downloadable_media("https://media.tenor.com/abc/dance.gif"));
        assert!(!is_downloadable_media("https://giphy.com/x.gif"));
        assert!(!is_downloadable_media("ftp-ish nonsense"));
    }

    #[test]
    fn trailing_punctuation_is_not_part_of_a_url() {
        assert_eq!(trim_url_tail("https://x/a.png)."), "https://x/a.png");
        assert_eq!(trim_url_tail("https://x/a.png?x=1"), "https://x/a.png?x=1");
    }

    #[test]
    fn emote_marker_sanitizes_name() {
        assert_eq!(
            emote_marker("downloaded_files/emotes/ab.png", "pepe~1"),
            "@@LOCAL_EMOTE@@downloaded_files/emotes/ab.png|:pepe1:"
        );
    }

    #[test]
    fn splice_keeps_untouched_text() {
        let text = "a X b Y c";
        let out = splice(
            text,
            vec![
                Replacement { start: 2, end: 3, text: "1".into() },
                Replacement { start: 6, end: 7, text: "22".into() },
            ],
        );
        assert_eq!(out, "a 1 b 22 c");
    }
}
