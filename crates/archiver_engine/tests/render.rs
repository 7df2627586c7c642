use std::fs;

use archiver_engine::{HtmlRenderer, RenderError, RenderJob, Renderer};
use serde_json::json;
use tempfile::TempDir;

fn job(root: &TempDir) -> RenderJob {
    RenderJob {
        processed_dir: root.path().join("processed_messages"),
        output_dir: root.path().join("processed_html"),
        channel_name: "dev <team>".into(),
        channel_id: "77".into(),
        guild_id: Some("5".into()),
    }
}

fn msg(id: u32) -> serde_json::Value {
    json!({
        "id": format!("{id}"),
        "content": format!("message number {id}"),
        "timestamp": "2024-02-03T04:05:06+00:00",
        "author": {"id": "1", "username": "alice", "avatar": null}
    })
}

fn write_batch(root: &TempDir, name: &str, messages: serde_json::Value) {
    let dir = root.path().join("processed_messages");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), serde_json::to_string(&messages).unwrap()).unwrap();
}

#[test]
fn pages_run_oldest_first_with_navigation() {
    let root = TempDir::new().unwrap();
    // Batches are newest first, as fetched.
    write_batch(&root, "batch_00001.json", json!([msg(5), msg(4), msg(3)]));
    write_batch(&root, "batch_00002.json", json!([msg(2), msg(1)]));

    let output = HtmlRenderer::new(2).render(&job(&root)).unwrap();
    assert_eq!(output.pages, 3);
    assert_eq!(output.messages, 5);

    let html = root.path().join("processed_html");
    let index = fs::read_to_string(html.join("index.html")).unwrap();
    assert!(index.contains("message number 1"));
    assert!(index.contains("message number 2"));
    assert!(!index.contains("message number 3"));
    assert!(index.contains(r#"href="page_2.html""#));
    assert!(index.contains("#dev &lt;team&gt;"));

    let last = fs::read_to_string(html.join("page_3.html")).unwrap();
    assert!(last.contains("message number 5"));
    assert!(last.contains(r#"href="page_2.html""#));
    assert!(!last.contains("Newer"));
    assert!(html.join("style.css").is_file());
}

#[test]
fn message_details_are_rendered() {
    let root = TempDir::new().unwrap();
    write_batch(
        &root,
        "batch_00001.json",
        json!([{
            "id": "10",
            "content": "hi @@LOCAL_EMOTE@@downloaded_files/emotes/e.png|:wave: <script>",
            "timestamp": "2024-02-03T04:05:06+00:00",
            "edited_timestamp": "2024-02-03T05:00:00+00:00",
            "author": {"id": "1", "username": "bob", "global_name": "Bobby", "avatar": "downloaded_files/avatars/a.png", "bot": true},
            "attachments": [
                {"filename": "clip.mp4", "url": "downloaded_files/attachments/c.mp4", "size": 2048},
                {"filename": "SPOILER_x.png", "url": "downloaded_files/attachments/x.png", "content_type": "image/png"}
            ],
            "embeds": [{"title": "Link", "url": "https://example.com", "description": "desc", "color": 16711680}],
            "reactions": [{"count": 3, "emoji": {"name": "👍"}}],
            "sticker_items": [{"id": "1", "name": "Wumpus"}],
            "referenced_message": {"id": "9", "content": "original", "author": {"username": "carol"}}
        }]),
    );

    HtmlRenderer::default().render(&job(&root)).unwrap();
    let index = fs::read_to_string(root.path().join("processed_html/index.html")).unwrap();

    assert!(index.contains("Bobby"));
    assert!(index.contains("BOT"));
    assert!(index.contains("(edited)"));
    assert!(index.contains("2024-02-03 04:05"));
    assert!(index.contains(r#"<img class="avatar" src="downloaded_files/avatars/a.png""#));
    assert!(index.contains(r#"<img class="emote" src="downloaded_files/emotes/e.png" alt=":wave:""#));
    assert!(index.contains("&lt;script&gt;"));
    assert!(!index.contains("<script>"));
    assert!(index.contains(r#"<video src="downloaded_files/attachments/c.mp4""#));
    assert!(index.contains("attachment spoiler"));
    assert!(index.contains("border-left-color:#ff0000"));
    assert!(index.contains("👍 3"));
    assert!(index.contains("Sticker: Wumpus"));
    assert!(index.contains(r##"href="#msg-9""##));
    assert!(index.contains("original"));
}

#[test]
fn missing_avatar_gets_a_placeholder() {
    let root = TempDir::new().unwrap();
    write_batch(&root, "batch_00001.json", json!([msg(1)]));
    HtmlRenderer::default().render(&job(&root)).unwrap();
    let index = fs::read_to_string(root.path().join("processed_html/index.html")).unwrap();
    assert!(index.contains(r#"<div class="avatar placeholder">A</div>"#));
}

#[test]
fn no_batches_still_produce_an_index() {
    let root = TempDir::new().unwrap();
    let output = HtmlRenderer::default().render(&job(&root)).unwrap();
    assert_eq!(output.pages, 1);
    assert_eq!(output.messages, 0);
    let index = fs::read_to_string(root.path().join("processed_html/index.html")).unwrap();
    assert!(index.contains("This channel has no messages."));
    assert!(!root.path().join("processed_html/page_2.html").exists());
}

#[test]
fn malformed_batch_is_an_error() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("processed_messages");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("batch_00001.json"), "{not json").unwrap();

    let err = HtmlRenderer::default().render(&job(&root)).unwrap_err();
    assert!(matches!(err, RenderError::MalformedBatch { ref file, .. } if file == "batch_00001.json"));
}
