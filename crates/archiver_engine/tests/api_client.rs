use std::time::{Duration, Instant};

use archiver_engine::{ApiBody, ApiClient, ApiError, ApiSettings};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(ApiSettings::with_base_url(server.uri())).expect("client")
}

#[tokio::test]
async fn rate_limited_request_waits_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/channels/42"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "1")
                .set_body_json(json!({"message": "You are being rate limited.", "retry_after": 1.0})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "42", "name": "general"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let started = Instant::now();
    let channel = client.get_channel("tok", "42").await.expect("retried");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(channel.id, "42");
    assert_eq!(channel.name.as_deref(), Some("general"));
}

#[tokio::test]
async fn token_is_sent_as_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/guilds"))
        .and(header("authorization", "secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "1", "name": "Guild"}])))
        .expect(1)
        .mount(&server)
        .await;

    let guilds = client_for(&server).list_guilds("  secret-token ").await.unwrap();
    assert_eq!(guilds, json!([{"id": "1", "name": "Guild"}]));
}

#[tokio::test]
async fn auth_and_lookup_failures_are_classified_without_retry() {
    let server = MockServer::start().await;
    Mock::given(path("/channels/401"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/channels/403"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/channels/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/channels/500"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert_eq!(client.get_channel("t", "401").await.unwrap_err(), ApiError::Unauthorized);
    assert!(matches!(
        client.get_channel("t", "403").await.unwrap_err(),
        ApiError::Forbidden(p) if p == "/channels/403"
    ));
    assert!(matches!(
        client.get_channel("t", "404").await.unwrap_err(),
        ApiError::NotFound(_)
    ));
    let err = client.get_channel("t", "500").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Status {
            status: 500,
            body: "boom".into()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn body_shape_follows_content_type() {
    let server = MockServer::start().await;
    Mock::given(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(path("/text"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("plain words", "text/plain"))
        .mount(&server)
        .await;
    Mock::given(path("/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let get = |p: &str| client.endpoint(p);
    assert_eq!(
        client.request("t", &get("/empty"), reqwest::Method::GET).await.unwrap(),
        ApiBody::Empty
    );
    assert_eq!(
        client.request("t", &get("/text"), reqwest::Method::GET).await.unwrap(),
        ApiBody::Text("plain words".into())
    );
    assert_eq!(
        client.request("t", &get("/json"), reqwest::Method::GET).await.unwrap(),
        ApiBody::Json(json!({"ok": true}))
    );
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut settings = ApiSettings::with_base_url(server.uri());
    settings.request_timeout = Duration::from_millis(100);
    let client = ApiClient::new(settings).unwrap();
    let err = client
        .request("t", &client.endpoint("/slow"), reqwest::Method::GET)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn invalid_urls_are_rejected_before_sending() {
    let client = ApiClient::new(ApiSettings::default()).unwrap();
    let err = client
        .request("t", "not a url", reqwest::Method::GET)
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::InvalidUrl("not a url".into()));
}
