//! Integration tests for image upload, analysis history and reports.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use mediscan::config::{Config, SecurityConfig};
use serde_json::{Value, json};
use std::path::PathBuf;
use tower::ServiceExt;

const BOUNDARY: &str = "mediscan-test-boundary";

const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

struct TestApp {
    router: Router,
    uploads: PathBuf,
}

async fn spawn_app_with(customize: impl FnOnce(&mut Config)) -> TestApp {
    let id = uuid::Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("mediscan-analysis-test-{id}.db"));
    let uploads = std::env::temp_dir().join(format!("mediscan-analysis-uploads-{id}"));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.storage.uploads_path = uploads.display().to_string();
    config.security = SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
    };
    customize(&mut config);

    let state = mediscan::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");

    TestApp {
        router: mediscan::api::router(state),
        uploads,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

fn png_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = PNG_HEADER.to_vec();
    bytes.extend(std::iter::repeat_n(seed, 256));
    bytes
}

fn multipart_body(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn read_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn get_with(app: &Router, uri: &str, header: (&str, &str)) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header.0, header.1)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

/// Registers a user and returns the `Authorization` header value.
async fn bearer_for(app: &Router, email: &str) -> String {
    let (status, _) = post_json(
        app,
        "/api/auth/register",
        json!({ "name": "Test", "email": email, "password": "test123" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post_json(
        app,
        "/api/auth/login",
        json!({ "email": email, "password": "test123" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    format!("Bearer {}", body["token"].as_str().unwrap())
}

async fn upload(
    app: &Router,
    uri: &str,
    credentials: (&str, &str),
    body: Vec<u8>,
) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(credentials.0, credentials.1)
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    read_json(response).await
}

async fn analyze_png(app: &Router, auth: &str, filename: &str, seed: u8) -> Value {
    let (status, body) = upload(
        app,
        "/api/ml/analyze",
        ("Authorization", auth),
        multipart_body("image", filename, "image/png", &png_bytes(seed)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "analyze failed: {body}");
    body
}

#[tokio::test]
async fn test_analyze_returns_ranked_predictions() {
    let app = spawn_app().await;
    let auth = bearer_for(&app.router, "ann@example.com").await;

    let body = analyze_png(&app.router, &auth, "chest scan.png", 7).await;

    assert_eq!(body["status"], "success");
    assert_eq!(body["source"], "simulated");
    assert_eq!(body["filename"], "chest_scan.png");
    assert!(body["analysis_id"].as_i64().unwrap() > 0);

    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 5);
    let probabilities: Vec<f64> = predictions
        .iter()
        .map(|p| p["probability"].as_f64().unwrap())
        .collect();
    assert!(probabilities.windows(2).all(|w| w[0] >= w[1]));
    assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));

    // The stored image is served under /uploads
    let image_url = body["image_url"].as_str().unwrap();
    assert!(image_url.starts_with("/uploads/"));
    let stored_name = image_url.trim_start_matches("/uploads/");
    assert!(stored_name.ends_with(".png"));
    assert!(app.uploads.join(stored_name).exists());

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(image_url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.as_ref(), png_bytes(7).as_slice());
}

#[tokio::test]
async fn test_same_image_gives_same_simulated_result() {
    let app = spawn_app().await;
    let auth = bearer_for(&app.router, "ann@example.com").await;

    let first = analyze_png(&app.router, &auth, "a.png", 3).await;
    let second = analyze_png(&app.router, &auth, "b.png", 3).await;

    assert_eq!(first["predictions"], second["predictions"]);
    assert_ne!(first["analysis_id"], second["analysis_id"]);
    assert_ne!(first["image_url"], second["image_url"]);
}

#[tokio::test]
async fn test_analyze_requires_token() {
    let app = spawn_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ml/analyze")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(
                    "image",
                    "x.png",
                    "image/png",
                    &png_bytes(1),
                )))
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = read_json(response).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token is missing!");
}

#[tokio::test]
async fn test_analyze_rejects_bad_uploads() {
    let app = spawn_app_with(|c| c.storage.max_upload_bytes = 1024).await;
    let auth = bearer_for(&app.router, "ann@example.com").await;
    let credentials = ("Authorization", auth.as_str());

    // Wrong field name
    let (status, body) = upload(
        &app.router,
        "/api/ml/analyze",
        credentials,
        multipart_body("file", "x.png", "image/png", &png_bytes(1)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file part");

    // Empty filename
    let (status, body) = upload(
        &app.router,
        "/api/ml/analyze",
        credentials,
        multipart_body("image", "", "image/png", &png_bytes(1)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No selected file");

    // Not an image
    let (status, body) = upload(
        &app.router,
        "/api/ml/analyze",
        credentials,
        multipart_body("image", "notes.txt", "text/plain", b"hello"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only image files are allowed");

    // Image MIME type but the bytes are not an image
    let (status, _) = upload(
        &app.router,
        "/api/ml/analyze",
        credentials,
        multipart_body("image", "fake.png", "image/png", b"definitely not a png"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Over the configured cap
    let mut big = PNG_HEADER.to_vec();
    big.resize(4096, 0);
    let (status, body) = upload(
        &app.router,
        "/api/ml/analyze",
        credentials,
        multipart_body("image", "big.png", "image/png", &big),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["status"], "error");

    // Nothing was stored or recorded
    let (_, body) = get_with(&app.router, "/api/ml/history", credentials).await;
    assert_eq!(body["analyses"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_analyze_rejects_non_multipart_body() {
    let app = spawn_app_with(|_| {}).await;
    let auth = bearer_for(&app.router, "ann@example.com").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/ml/analyze")
                .header("Authorization", auth.as_str())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"image":"x.png"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = read_json(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("No file part"));
}

#[tokio::test]
async fn test_history_is_per_user_and_newest_first() {
    let app = spawn_app().await;
    let ann = bearer_for(&app.router, "ann@example.com").await;
    let bob = bearer_for(&app.router, "bob@example.com").await;

    let first = analyze_png(&app.router, &ann, "first.png", 1).await;
    let second = analyze_png(&app.router, &ann, "second.png", 2).await;
    analyze_png(&app.router, &bob, "bob.png", 3).await;

    let (status, body) = get_with(&app.router, "/api/ml/history", ("Authorization", ann.as_str())).await;
    assert_eq!(status, StatusCode::OK);
    let analyses = body["analyses"].as_array().unwrap();
    assert_eq!(analyses.len(), 2);
    assert_eq!(analyses[0]["id"], second["analysis_id"]);
    assert_eq!(analyses[1]["id"], first["analysis_id"]);
    assert_eq!(analyses[0]["filename"], "second.png");
    assert!(analyses[0].get("user_id").is_none());

    let (_, body) = get_with(
        &app.router,
        "/api/ml/history?limit=1",
        ("Authorization", ann.as_str()),
    )
    .await;
    assert_eq!(body["analyses"].as_array().unwrap().len(), 1);

    let (status, body) = get_with(
        &app.router,
        "/api/ml/history?limit=0",
        ("Authorization", ann.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_single_analysis_ownership() {
    let app = spawn_app().await;
    let ann = bearer_for(&app.router, "ann@example.com").await;
    let bob = bearer_for(&app.router, "bob@example.com").await;

    let created = analyze_png(&app.router, &ann, "mine.png", 9).await;
    let id = created["analysis_id"].as_i64().unwrap();
    let uri = format!("/api/ml/analysis/{id}");

    let (status, body) = get_with(&app.router, &uri, ("Authorization", ann.as_str())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analysis"]["id"], id);
    assert_eq!(body["analysis"]["predictions"], created["predictions"]);

    let (status, _) = get_with(&app.router, &uri, ("Authorization", bob.as_str())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) =
        get_with(&app.router, "/api/ml/analysis/99999", ("Authorization", ann.as_str())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Analysis not found");
}

#[tokio::test]
async fn test_missing_image_falls_back_to_placeholder() {
    let app = spawn_app().await;
    let auth = bearer_for(&app.router, "ann@example.com").await;

    let created = analyze_png(&app.router, &auth, "gone.png", 4).await;
    let stored_name = created["image_url"]
        .as_str()
        .unwrap()
        .trim_start_matches("/uploads/")
        .to_string();
    std::fs::remove_file(app.uploads.join(&stored_name)).unwrap();

    let (_, body) = get_with(&app.router, "/api/ml/history", ("Authorization", auth.as_str())).await;
    assert_eq!(
        body["analyses"][0]["image_url"],
        mediscan::constants::defaults::PLACEHOLDER_IMAGE_URL
    );
}

#[tokio::test]
async fn test_report_download() {
    let app = spawn_app().await;
    let auth = bearer_for(&app.router, "ann@example.com").await;

    let created = analyze_png(&app.router, &auth, "report.png", 5).await;
    let id = created["analysis_id"].as_i64().unwrap();
    let top_label = created["predictions"][0]["label"].as_str().unwrap().to_string();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/ml/analysis-report/{id}"))
                .header("Authorization", auth.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(disposition.contains(&format!("mediscan-report-{id}.txt")));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let report = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(report.contains(&format!("Analysis ID: {id}")));
    assert!(report.contains("report.png"));
    assert!(report.contains(&top_label));
}

#[tokio::test]
async fn test_emergency_analyze_with_key() {
    let app = spawn_app().await;

    let (status, body) = post_json(
        &app.router,
        "/api/auth/direct-register",
        json!({ "name": "Er Doc", "email": "er@example.com", "password": "secret1" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let key = body["emergency_key"].as_str().unwrap().to_string();

    let (status, body) = upload(
        &app.router,
        "/api/ml/emergency-analyze",
        ("X-Emergency-Key", key.as_str()),
        multipart_body("image", "er.jpg", "image/jpeg", &[0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["source"], "simulated");
    assert!(body["image_url"].as_str().unwrap().ends_with(".jpg"));
    let id = body["analysis_id"].as_i64().unwrap();

    let (status, body) =
        get_with(&app.router, "/api/ml/emergency-history", ("X-Emergency-Key", key.as_str())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["analyses"][0]["id"], id);

    let (status, _) = get_with(
        &app.router,
        &format!("/api/ml/analysis/{id}"),
        ("X-Emergency-Key", key.as_str()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
