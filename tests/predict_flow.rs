//! End-to-end predict flow against a mocked remote inference service.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vqa_proxy::backend::Connection;
use vqa_proxy::config::{
    AppConfig, AuthConfig, BackendConfig, CorsConfig, ServerConfig, UploadsConfig,
};
use vqa_proxy::proxy::{build_router, ProxyState};

const BOUNDARY: &str = "test-boundary";
const SECRET: &str = "integration-secret";

struct TestApp {
    app: Router,
    uploads: TempDir,
    connection: Arc<Connection>,
}

impl TestApp {
    fn uploads_count(&self) -> usize {
        std::fs::read_dir(self.uploads.path()).unwrap().count()
    }
}

async fn build_app(backend: BackendConfig, auth: AuthConfig, connect: bool) -> TestApp {
    let uploads = TempDir::new().unwrap();

    let config = AppConfig {
        server: ServerConfig::default(),
        backend: backend.clone(),
        auth,
        cors: CorsConfig::default(),
        uploads: UploadsConfig {
            dir: uploads.path().to_string_lossy().to_string(),
        },
    };

    let connection = Arc::new(Connection::new(backend, reqwest::Client::new()));
    if connect {
        connection.connect().await.expect("probe should succeed");
    }

    let state = ProxyState {
        config: Arc::new(config),
        connection: connection.clone(),
    };

    TestApp {
        app: build_router(state),
        uploads,
        connection,
    }
}

fn backend_config(url: &str) -> BackendConfig {
    BackendConfig {
        url: url.to_string(),
        ..BackendConfig::default()
    }
}

fn enabled_auth() -> AuthConfig {
    AuthConfig {
        enabled: true,
        secret: Some(SECRET.to_string()),
    }
}

async fn mount_probe_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(server)
        .await;
}

fn multipart_body(parts: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content_type, bytes) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                name, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn valid_upload_pair() -> Vec<u8> {
    multipart_body(&[
        ("image", "scan.jpg", "image/jpeg", b"fake jpeg bytes"),
        ("audio", "question.wav", "audio/wav", b"fake wav bytes"),
    ])
}

fn predict_request(body: Vec<u8>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

fn make_token(secret: &str) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    encode(
        &Header::default(),
        &json!({ "username": "alice", "exp": exp }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_predict_happy_path() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    // The remote must see exactly one request carrying both configured
    // file field names
    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_string_contains("name=\"image\""))
        .and(body_string_contains("name=\"audio\""))
        .and(body_string_contains("scan.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prediction": "yes" })))
        .expect(1)
        .mount(&server)
        .await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({ "prediction": "yes" }));
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_predict_with_renamed_backend_params() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/predict"))
        .and(body_string_contains("name=\"image_input\""))
        .and(body_string_contains("name=\"audio_input\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prediction": "no" })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = BackendConfig {
        image_param: "image_input".to_string(),
        audio_param: "audio_input".to_string(),
        ..backend_config(&server.uri())
    };
    let test = build_app(backend, AuthConfig::default(), true).await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["prediction"], "no");
}

#[tokio::test]
async fn test_predict_rejects_bad_image_type() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    // The remote must never be called for an invalid upload
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let body = multipart_body(&[
        ("image", "anim.gif", "image/gif", b"gif bytes"),
        ("audio", "question.wav", "audio/wav", b"fake wav bytes"),
    ]);
    let response = test
        .app
        .clone()
        .oneshot(predict_request(body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("image/gif"));
    assert!(message.contains("anim.gif"));
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_predict_rejects_bad_audio_type() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let body = multipart_body(&[
        ("image", "scan.jpg", "image/jpeg", b"fake jpeg bytes"),
        ("audio", "clip.ogg", "audio/ogg", b"ogg bytes"),
    ]);
    let response = test
        .app
        .clone()
        .oneshot(predict_request(body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("audio/ogg"));
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_predict_missing_audio_field() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let body = multipart_body(&[("image", "scan.jpg", "image/jpeg", b"fake jpeg bytes")]);
    let response = test
        .app
        .clone()
        .oneshot(predict_request(body, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("audio"));
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_predict_requires_token_when_auth_enabled() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let test = build_app(backend_config(&server.uri()), enabled_auth(), true).await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("No token provided"));
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_predict_rejects_token_with_wrong_secret() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    let test = build_app(backend_config(&server.uri()), enabled_auth(), true).await;

    let token = make_token("some-other-secret");
    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_predict_accepts_valid_token() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prediction": "yes" })))
        .expect(1)
        .mount(&server)
        .await;

    let test = build_app(backend_config(&server.uri()), enabled_auth(), true).await;

    let token = make_token(SECRET);
    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_auth_enabled_without_secret_is_misconfiguration() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    let auth = AuthConfig {
        enabled: true,
        secret: None,
    };
    let test = build_app(backend_config(&server.uri()), auth, true).await;

    let token = make_token(SECRET);
    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("JWT_SECRET"));
}

#[tokio::test]
async fn test_predict_unavailable_when_not_connected() {
    // The mock server answers 404 to the unmatched probe, so the lazy
    // reconnect fails and the request must fail fast
    let server = MockServer::start().await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), false).await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Not connected"));
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_predict_recovers_after_backend_comes_back() {
    let server = MockServer::start().await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), false).await;

    // Degraded while the handle is absent
    let health = test
        .app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Backend comes up; the next request reconnects lazily and succeeds
    mount_probe_ok(&server).await;
    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prediction": "yes" })))
        .mount(&server)
        .await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(test.connection.is_live().await);

    let health = test
        .app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_empty_prediction_is_internal_error() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prediction": "" })))
        .mount(&server)
        .await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Empty prediction"));
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_malformed_remote_body_is_internal_error() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>surprise</html>"))
        .mount(&server)
        .await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_upstream_error_status_is_propagated() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    Mock::given(method("POST"))
        .and(path("/predict"))
        .respond_with(ResponseTemplate::new(418).set_body_string("teapot"))
        .mount(&server)
        .await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let response = test
        .app
        .clone()
        .oneshot(predict_request(valid_upload_pair(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Remote API call failed");
    assert_eq!(body["status_code"], 418);
    assert_eq!(body["details"], "teapot");
    assert_eq!(test.uploads_count(), 0);
}

#[tokio::test]
async fn test_health_and_ping_when_connected() {
    let server = MockServer::start().await;
    mount_probe_ok(&server).await;

    let test = build_app(backend_config(&server.uri()), AuthConfig::default(), true).await;

    let health = test
        .app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body = body_json(health).await;
    assert!(body["status"].as_str().unwrap().contains("connected"));

    let ping = test
        .app
        .clone()
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ping.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(ping.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"pong");
}
