use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use stream_recorder::api::{ApiState, router};
use stream_recorder::config::Settings;
use stream_recorder::flv::{self, TagKind};
use stream_recorder::recorder::Recorder;
use stream_recorder::testing::mocks::MockBus;

fn app() -> (tempfile::TempDir, Arc<MockBus>, Arc<Recorder>, Router) {
    let dir = tempfile::tempdir().unwrap();
    let bus = Arc::new(MockBus::new());
    let settings = Arc::new(Settings::new(dir.path()));
    let recorder = Arc::new(Recorder::new(settings, bus.clone()));
    let router = router(ApiState::new(recorder.clone()));
    (dir, bus, recorder, router)
}

async fn send(router: &Router, request: Request<Body>) -> axum::response::Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn start_and_stop_report_sentinels() {
    let (_dir, _bus, recorder, router) = app();

    assert_eq!(
        get(&router, "/api/record/start?streamPath=live/cam1").await,
        (StatusCode::OK, "success".to_string())
    );
    assert!(recorder.is_recording("live/cam1"));

    let (status, body) = get(&router, "/api/record/start?streamPath=live/cam1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("already recording"), "{}", body);

    assert_eq!(get(&router, "/api/record/stop?streamPath=live/cam1").await.1, "success");
    assert_eq!(
        get(&router, "/api/record/stop?streamPath=live/cam1").await.1,
        "no query stream"
    );
    assert_eq!(get(&router, "/api/record/stop").await.1, "no such stream");
}

#[tokio::test]
async fn missing_stream_path_is_reported_in_body() {
    let (_dir, _bus, _recorder, router) = app();

    for uri in [
        "/api/record/start",
        "/api/record/start?streamPath=",
        "/api/record/play",
        "/api/record/delete",
    ] {
        assert_eq!(get(&router, uri).await, (StatusCode::OK, "no streamPath".to_string()));
    }
}

#[tokio::test]
async fn delete_missing_file() {
    let (dir, _bus, _recorder, router) = app();
    std::fs::write(dir.path().join("keep.flv"), b"x").unwrap();

    assert_eq!(
        get(&router, "/api/record/delete?streamPath=live/none").await.1,
        "no such file"
    );
    assert!(dir.path().join("keep.flv").exists());
}

#[tokio::test]
async fn list_returns_flv_descriptors() {
    let (dir, _bus, _recorder, router) = app();
    std::fs::create_dir_all(dir.path().join("a")).unwrap();
    let mut buf = Vec::new();
    flv::write_header(&mut buf).unwrap();
    flv::write_tag(&mut buf, TagKind::Video, 5000, &[0u8; 72]).unwrap();
    std::fs::write(dir.path().join("a/b.flv"), buf).unwrap();
    std::fs::write(dir.path().join("a/b.txt"), b"ignored").unwrap();

    let (status, body) = get(&router, "/api/record/list").await;
    assert_eq!(status, StatusCode::OK);
    let listed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        listed,
        serde_json::json!([{ "Path": "a/b.flv", "Size": 100, "Duration": 5000 }])
    );
}

#[tokio::test]
async fn list_error_is_embedded_in_json() {
    let (dir, bus, _recorder, _router) = app();
    let settings = Arc::new(Settings::new(dir.path().join("missing")));
    let recorder = Arc::new(Recorder::new(settings, bus));
    let router = router(ApiState::new(recorder));

    let (_, body) = get(&router, "/api/record/list").await;
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(value["err"].as_str().is_some_and(|msg| !msg.is_empty()));
}

#[tokio::test]
async fn play_and_delete_recorded_file() {
    let (dir, bus, _recorder, router) = app();

    get(&router, "/api/record/start?streamPath=live/cam1&append=true").await;
    get(&router, "/api/record/stop?streamPath=live/cam1").await;

    assert_eq!(get(&router, "/api/record/play?streamPath=live/cam1").await.1, "success");
    assert_eq!(bus.published().len(), 1);

    let (_, active) = get(&router, "/api/record/active").await;
    assert_eq!(active, "[]");

    assert_eq!(get(&router, "/api/record/delete?streamPath=live/cam1").await.1, "success");
    assert!(!dir.path().join("live/cam1.flv").exists());
}

#[tokio::test]
async fn vod_serves_recorded_files() {
    let (dir, _bus, _recorder, router) = app();
    std::fs::create_dir_all(dir.path().join("live")).unwrap();
    std::fs::write(dir.path().join("live/cam1.flv"), b"FLV-bytes").unwrap();

    assert_eq!(
        get(&router, "/vod/live/cam1.flv").await,
        (StatusCode::OK, "FLV-bytes".to_string())
    );
}

#[tokio::test]
async fn cors_headers_on_every_route() {
    let (_dir, _bus, _recorder, router) = app();

    for uri in [
        "/api/record/list",
        "/api/record/active",
        "/api/record/start",
        "/api/record/stop",
        "/api/record/play",
        "/api/record/delete",
        "/api/record/auto",
    ] {
        let request = Request::builder()
            .uri(uri)
            .header("origin", "http://player.example")
            .body(Body::empty())
            .unwrap();
        let response = send(&router, request).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert!(
            response.headers().contains_key("access-control-allow-origin"),
            "{}",
            uri
        );
    }
}

#[tokio::test]
async fn cors_preflight_is_allowed() {
    let (_dir, _bus, recorder, router) = app();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/record/start?streamPath=live/cam1")
        .header("origin", "http://player.example")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("access-control-allow-origin"));
    assert!(response.headers().contains_key("access-control-allow-methods"));
    // Preflight startet keine Aufnahme
    assert!(!recorder.is_recording("live/cam1"));
}

#[tokio::test]
async fn auto_record_flag_can_be_switched() {
    let (_dir, _bus, recorder, router) = app();

    assert_eq!(get(&router, "/api/record/auto").await.1, "false");
    assert_eq!(get(&router, "/api/record/auto?enable=true").await.1, "success");
    assert!(recorder.auto_record());
    assert_eq!(get(&router, "/api/record/auto").await.1, "true");

    let (_, body) = get(&router, "/api/record/auto?enable=yes").await;
    assert!(body.starts_with("invalid enable"));
    assert!(recorder.auto_record());

    assert_eq!(get(&router, "/api/record/auto?enable=false").await.1, "success");
    assert!(!recorder.auto_record());
}
