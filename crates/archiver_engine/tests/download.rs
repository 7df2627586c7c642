use std::fs;

use archiver_core::AssetCategory;
use archiver_engine::{AssetDownloader, DownloadFailure, DownloadSettings};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn downloader(root: &TempDir) -> AssetDownloader {
    AssetDownloader::new(
        reqwest::Client::new(),
        root.path().to_path_buf(),
        DownloadSettings::default(),
    )
}

fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn same_url_is_downloaded_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/att/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cat picture bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let mut dl = downloader(&root);
    let url = format!("{}/att/cat.png", server.uri());

    let first = dl
        .fetch_and_store(&url, AssetCategory::Attachments, None)
        .await
        .unwrap();
    let second = dl
        .fetch_and_store(&url, AssetCategory::Attachments, None)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert!(first.starts_with("downloaded_files/attachments/"));
    assert!(first.ends_with(".png"));
    assert!(root.path().join(&first).is_file());
    assert_eq!(fs::read(root.path().join(&first)).unwrap(), b"cat picture bytes");
    let counters = dl.counters();
    assert_eq!(counters.downloaded, 1);
    assert_eq!(counters.cache_hits, 1);
    assert_eq!(dl.cache().get(&url), Some(&first));
}

#[tokio::test]
async fn identical_content_from_two_urls_shares_one_file() {
    let server = MockServer::start().await;
    for p in ["/a/one.png", "/b/two.png"] {
        Mock::given(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"same bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let root = TempDir::new().unwrap();
    let mut dl = downloader(&root);
    let one = dl
        .fetch_and_store(&format!("{}/a/one.png", server.uri()), AssetCategory::Attachments, None)
        .await
        .unwrap();
    let two = dl
        .fetch_and_store(&format!("{}/b/two.png", server.uri()), AssetCategory::Attachments, None)
        .await
        .unwrap();

    assert_eq!(one, two);
    assert_eq!(files_in(&root.path().join("downloaded_files/attachments")).len(), 1);
    assert_eq!(dl.cache().len(), 2);
    assert_eq!(dl.counters().content_duplicates, 1);
}

#[tokio::test]
async fn forced_extension_and_category_shape_the_path() {
    let server = MockServer::start().await;
    Mock::given(path("/emojis/123456"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"gif".to_vec()))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let mut dl = downloader(&root);
    let rel = dl
        .fetch_and_store(
            &format!("{}/emojis/123456", server.uri()),
            AssetCategory::Emotes,
            Some("gif"),
        )
        .await
        .unwrap();

    let (dir, file) = rel.rsplit_once('/').unwrap();
    assert_eq!(dir, "downloaded_files/emotes");
    let (hash, ext) = file.split_once('.').unwrap();
    assert_eq!(ext, "gif");
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(!rel.starts_with('/'));
    assert!(!rel.contains(".."));
    assert!(!rel.contains('\\'));
}

#[tokio::test]
async fn failed_download_is_reported_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let mut dl = downloader(&root);
    let url = format!("{}/gone.png", server.uri());

    let err = dl
        .fetch_and_store(&url, AssetCategory::Attachments, None)
        .await
        .unwrap_err();
    assert_eq!(err.url, url);
    assert_eq!(err.cause, DownloadFailure::HttpStatus(404));

    let again = dl
        .fetch_and_store(&url, AssetCategory::Attachments, None)
        .await
        .unwrap_err();
    assert_eq!(again, err);
    assert_eq!(dl.counters().failures, 1);
    assert_eq!(dl.counters().cache_hits, 0);
    assert!(dl.cache().is_empty());
    assert!(!root.path().join("downloaded_files").exists());
}

#[tokio::test]
async fn unreachable_host_is_a_network_failure() {
    let root = TempDir::new().unwrap();
    let mut dl = downloader(&root);
    let err = dl
        .fetch_and_store("http://127.0.0.1:9/nothing.png", AssetCategory::Avatars, None)
        .await
        .unwrap_err();
    assert!(matches!(err.cause, DownloadFailure::Network(_) | DownloadFailure::Timeout));
}
