use super::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(server: &MockServer, max_bytes: usize) -> GraphMediaFetcher {
    let config = ProviderConfig {
        access_token: "test-token".to_string(),
        api_base: server.uri(),
        max_media_bytes: max_bytes,
        ..ProviderConfig::default()
    };
    GraphMediaFetcher::new(&config)
}

async fn mount_lookup(server: &MockServer, media_id: &str, mime: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v18.0/{media_id}")))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/download/{}", server.uri(), media_id),
            "mime_type": mime,
            "id": media_id,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_success() {
    let server = MockServer::start().await;
    mount_lookup(&server, "M1", "image/jpeg").await;
    Mock::given(method("GET"))
        .and(path("/download/M1"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let asset = fetcher_for(&server, 1024).fetch("M1").await.unwrap();
    assert_eq!(asset.media_id, "M1");
    assert_eq!(asset.content_type, "image/jpeg");
    assert_eq!(asset.bytes, vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
}

#[tokio::test]
async fn test_fetch_content_type_falls_back_to_lookup() {
    let server = MockServer::start().await;
    mount_lookup(&server, "A7", "audio/ogg; codecs=opus").await;
    Mock::given(method("GET"))
        .and(path("/download/A7"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OggS".to_vec()))
        .mount(&server)
        .await;

    let asset = fetcher_for(&server, 1024).fetch("A7").await.unwrap();
    assert_eq!(asset.content_type, "audio/ogg");
}

#[tokio::test]
async fn test_fetch_expired_id_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v18.0/OLD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher_for(&server, 1024).fetch("OLD").await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Fetch(FetchError::NotFound { ref media_id }) if media_id == "OLD"
    ));
}

#[tokio::test]
async fn test_fetch_graph_error_object_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v18.0/BAD"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"message": "Unsupported get request", "code": 100}
        })))
        .mount(&server)
        .await;

    let err = fetcher_for(&server, 1024).fetch("BAD").await.unwrap_err();
    assert!(matches!(err, RelayError::Fetch(FetchError::NotFound { .. })));
}

#[tokio::test]
async fn test_fetch_rejected_token_is_not_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v18.0/M5"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "message": "Error validating access token: Session has expired",
                "type": "OAuthException",
                "code": 190,
                "error_subcode": 463
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v18.0/M6"))
        .respond_with(ResponseTemplate::new(400).set_body_string("<html>bad request</html>"))
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server, 1024);
    for media_id in ["M5", "M6"] {
        let err = fetcher.fetch(media_id).await.unwrap_err();
        assert!(
            matches!(err, RelayError::Fetch(FetchError::Status { status: 400, .. })),
            "{media_id}: {err}"
        );
    }
}

#[tokio::test]
async fn test_fetch_server_error_is_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v18.0/M2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = fetcher_for(&server, 1024).fetch("M2").await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Fetch(FetchError::Status { status: 503, .. })
    ));
    assert!(err.is_degradable());
}

#[tokio::test]
async fn test_fetch_download_gone() {
    let server = MockServer::start().await;
    mount_lookup(&server, "M3", "video/mp4").await;
    Mock::given(method("GET"))
        .and(path("/download/M3"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let err = fetcher_for(&server, 1024).fetch("M3").await.unwrap_err();
    assert!(matches!(err, RelayError::Fetch(FetchError::NotFound { .. })));
}

#[tokio::test]
async fn test_fetch_declared_size_over_limit_skips_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v18.0/BIG"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/download/BIG", server.uri()),
            "mime_type": "video/mp4",
            "file_size": 5000,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/BIG"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = fetcher_for(&server, 100).fetch("BIG").await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Fetch(FetchError::TooLarge { limit: 100, .. })
    ));
}

#[tokio::test]
async fn test_fetch_body_over_limit_is_rejected() {
    let server = MockServer::start().await;
    mount_lookup(&server, "M4", "application/pdf").await;
    Mock::given(method("GET"))
        .and(path("/download/M4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 500]))
        .mount(&server)
        .await;

    let err = fetcher_for(&server, 100).fetch("M4").await.unwrap_err();
    assert!(matches!(err, RelayError::Fetch(FetchError::TooLarge { .. })));
}

#[tokio::test]
async fn test_fetch_transport_failure() {
    let config = ProviderConfig {
        access_token: "t".to_string(),
        // Port 9 (discard) on localhost is not expected to accept connections
        api_base: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..ProviderConfig::default()
    };
    let err = GraphMediaFetcher::new(&config)
        .fetch("M5")
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Fetch(FetchError::Transport { .. })));
}

#[test]
fn test_lookup_url_encodes_id() {
    let config = ProviderConfig {
        api_base: "https://graph.example.com/".to_string(),
        ..ProviderConfig::default()
    };
    let fetcher = GraphMediaFetcher::new(&config);
    assert_eq!(
        fetcher.lookup_url("a/b"),
        "https://graph.example.com/v18.0/a%2Fb"
    );
}
