use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    routing::get,
    Router,
};
use chrono::{Duration, Utc};
use secrecy::Secret;
use serde_json::json;
use tower::ServiceExt;
use tower_sessions::Session;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use idcard_portal::api::health::{health_check, HealthResponse};
use idcard_portal::api::middleware::session::{
    create_session_layer, AppState, SESSION_KEY_STUDENT,
};
use idcard_portal::config::Config;
use idcard_portal::services::asset_loader::AssetLoader;
use idcard_portal::services::card_export::CardExporter;
use idcard_portal::services::card_template::CardTemplate;
use idcard_portal::services::oauth::google::GoogleIdentity;
use idcard_portal::services::portal_api::PortalApi;
use idcard_portal::services::rasterizer::Rasterizer;
use idcard_portal::services::render_target::RenderHost;

fn config(api_base_url: &str) -> Config {
    Config {
        base_url: "http://localhost:3000".to_string(),
        host: "127.0.0.1".to_string(),
        port: 3000,
        api_base_url: api_base_url.to_string(),
        upload_base_url: format!("{}/uploads", api_base_url),
        http_timeout_secs: 5,
        google_client_id: "client-id".to_string(),
        google_client_secret: Secret::new("client-secret".to_string()),
        allowed_email_domain: "cse.bubt.edu.bd".to_string(),
        card_file_prefix: "BUBT-ID-Card".to_string(),
        institution_name: "Bangladesh University of Business and Technology".to_string(),
        institution_short_name: "BUBT".to_string(),
        secure_cookies: false,
    }
}

fn app(server: &MockServer) -> Router {
    let config = config(&server.uri());
    let client = reqwest::Client::new();
    let exporter = CardExporter::new(
        AssetLoader::with_client(client.clone(), &config.upload_base_url),
        CardTemplate::new(config.card_branding()),
        Rasterizer::with_fontdb(Arc::new(usvg::fontdb::Database::new())),
        RenderHost::new(),
        config.card_file_prefix.clone(),
    );
    let state = AppState {
        api: PortalApi::with_client(client, &config.api_base_url).unwrap(),
        config: Arc::new(config),
        exporter: Arc::new(exporter),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/test/student-session", get(student_session))
        .merge(idcard_portal::api::auth::router())
        .merge(idcard_portal::api::dashboard::router())
        .merge(idcard_portal::api::admin::router())
        .layer(create_session_layer(false))
        .with_state(state)
}

const STUDENT_EMAIL: &str = "farhana@cse.bubt.edu.bd";
const BOUNDARY: &str = "portal-test-boundary";

/// Stands in for the Google callback
async fn student_session(session: Session) -> StatusCode {
    let identity = GoogleIdentity {
        email: STUDENT_EMAIL.to_string(),
        name: Some("Farhana Akter".to_string()),
        picture: None,
    };
    match session.insert(SESSION_KEY_STUDENT, identity).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn session_cookie(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string()
}

async fn sign_in_student(app: &Router) -> String {
    let response = get_path(app.clone(), "/test/student-session").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    session_cookie(&response)
}

async fn sign_in_admin(app: &Router, server: &MockServer) -> String {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "jwt-123" })))
        .mount(server)
        .await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=registrar&password=s3cret"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    session_cookie(&response)
}

async fn get_with_cookie(app: &Router, uri: &str, cookie: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

fn multipart(fields: &[(&str, &str)]) -> Body {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    Body::from(body)
}

async fn submit(app: &Router, cookie: &str, fields: &[(&str, &str)]) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/dashboard/request")
                .header(header::COOKIE, cookie)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(multipart(fields))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn staff_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("studentId", "S-1042"),
        ("cardType", "staff"),
        ("firstName", "Farhana"),
        ("lastName", "Akter"),
        ("email", STUDENT_EMAIL),
        ("trxId", "TRX5501"),
        ("amount", "300"),
    ]
}

fn approved_record(student_id: &str, email: &str, approved_hours_ago: i64) -> serde_json::Value {
    json!({
        "_id": format!("rec-{}", student_id),
        "studentId": student_id,
        "firstName": "Farhana",
        "lastName": "Akter",
        "email": email,
        "cardType": "staff",
        "trxId": "TRX5501",
        "amount": 300,
        "status": "approved",
        "approvedAt": (Utc::now() - Duration::hours(approved_hours_ago)).to_rfc3339()
    })
}

async fn mount_applications(server: &MockServer, records: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/api/applications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": records })))
        .mount(server)
        .await;
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn get_path(app: Router, uri: &str) -> axum::response::Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_admin_routes_require_login() {
    let server = MockServer::start().await;

    for uri in ["/admin/dashboard", "/admin/application/22235103001"] {
        let response = get_path(app(&server), uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(location(&response), "/admin/login");
    }
}

#[tokio::test]
async fn test_card_download_requires_student() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/applications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let response = get_path(app(&server), "/applications/22235103001/card.pdf").await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_reset_link_without_token_goes_to_login() {
    let server = MockServer::start().await;

    let response = get_path(app(&server), "/reset-password?email=admin%40bubt.edu.bd").await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/login");
}

#[tokio::test]
async fn test_admin_login_stores_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "username": "registrar", "password": "s3cret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "jwt-123" })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=registrar&password=s3cret"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/dashboard");
    assert!(response.headers().contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_health_reports_backend_and_render_targets() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/api/applications"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let response = get_path(app(&server), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.dependencies.backend_api.status, "healthy");
    assert_eq!(health.dependencies.render_targets.live, 0);
}

#[tokio::test]
async fn test_health_is_unavailable_when_backend_fails() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/api/applications"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let response = get_path(app(&server), "/health").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_invalid_request_keeps_entered_values() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/students"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "success": true })))
        .expect(0)
        .mount(&server)
        .await;
    let app = app(&server);
    let cookie = sign_in_student(&app).await;

    let fields: Vec<_> = staff_fields()
        .into_iter()
        .filter(|(name, _)| *name != "lastName")
        .collect();
    let response = submit(&app, &cookie, &fields).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_text(response).await;
    assert!(body.contains("Please fill all required fields"));
    assert!(body.contains("value=\"TRX5501\""));
    assert!(body.contains("value=\"S-1042\""));
}

#[tokio::test]
async fn test_duplicate_trx_shows_friendly_notice_and_keeps_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/students"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": "TRX ID already exists"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let app = app(&server);
    let cookie = sign_in_student(&app).await;

    let response = submit(&app, &cookie, &staff_fields()).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_text(response).await;
    assert!(body.contains("This TRX ID is already used. Please use a different TRX ID."));
    assert!(body.contains("value=\"TRX5501\""));
}

#[tokio::test]
async fn test_plain_backend_refusal_is_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/students"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": "trxId is required"
        })))
        .mount(&server)
        .await;
    let app = app(&server);
    let cookie = sign_in_student(&app).await;

    let response = submit(&app, &cookie, &staff_fields()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("trxId is required"));
}

#[tokio::test]
async fn test_accepted_request_shows_summary_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/students"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;
    mount_applications(&server, vec![]).await;
    let app = app(&server);
    let cookie = sign_in_student(&app).await;

    let response = submit(&app, &cookie, &staff_fields()).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard?view=applications");

    let body = body_text(get_with_cookie(&app, "/dashboard?view=applications", &cookie).await).await;
    assert!(body.contains("Application Submitted"));
    assert!(body.contains("S-1042"));

    let body = body_text(get_with_cookie(&app, "/dashboard?view=applications", &cookie).await).await;
    assert!(!body.contains("Application Submitted"));
}

#[tokio::test]
async fn test_download_outside_validity_window_is_gone() {
    let server = MockServer::start().await;
    let mut pending = approved_record("S-2", STUDENT_EMAIL, 0);
    pending["status"] = json!("pending");
    pending["approvedAt"] = serde_json::Value::Null;
    mount_applications(
        &server,
        vec![approved_record("S-1", STUDENT_EMAIL, 80), pending],
    )
    .await;
    let app = app(&server);
    let cookie = sign_in_student(&app).await;

    for uri in ["/applications/S-1/card.pdf", "/applications/S-2/card.pdf"] {
        let response = get_with_cookie(&app, uri, &cookie).await;
        assert_eq!(response.status(), StatusCode::GONE, "{}", uri);
    }
}

#[tokio::test]
async fn test_download_of_unknown_or_foreign_card_is_not_found() {
    let server = MockServer::start().await;
    mount_applications(
        &server,
        vec![approved_record("S-9", "rakib@cse.bubt.edu.bd", 1)],
    )
    .await;
    let app = app(&server);
    let cookie = sign_in_student(&app).await;

    for uri in ["/applications/S-404/card.pdf", "/applications/S-9/card.pdf"] {
        let response = get_with_cookie(&app, uri, &cookie).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_download_streams_pdf_attachment() {
    let server = MockServer::start().await;
    mount_applications(&server, vec![approved_record("S-1042", STUDENT_EMAIL, 1)]).await;
    let app = app(&server);
    let cookie = sign_in_student(&app).await;

    let response = get_with_cookie(&app, "/applications/S-1042/card.pdf", &cookie).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"BUBT-ID-Card-S-1042.pdf\""
    );
    assert!(body_text_bytes(response).await.starts_with(b"%PDF-"));
}

async fn body_text_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_backend_rejecting_admin_token_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/admin/dashboard"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "jwt expired" })))
        .expect(1)
        .mount(&server)
        .await;
    let app = app(&server);
    let cookie = sign_in_admin(&app, &server).await;

    let response = get_with_cookie(&app, "/admin/dashboard", &cookie).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/login");

    // The token is gone, so the guard answers without calling the backend
    let response = get_with_cookie(&app, "/admin/dashboard", &cookie).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/admin/login");

    let body = body_text(get_with_cookie(&app, "/admin/login", &cookie).await).await;
    assert!(body.contains("Admin Login"));
}
