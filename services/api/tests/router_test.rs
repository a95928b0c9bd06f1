//! Requests driven through the full router, over the in-memory database and a
//! temporary blob store.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::{path::Path, sync::Arc};
use tax_analysis_core::{AnalysisPolicy, AnalysisSessionManager, SessionId, SessionStep};
use tax_analysis_testing::{analysis_payload, InMemoryDatabase};
use tax_api_lib::{
    adapters::LocalBlobAdapter,
    config::Config,
    error::ApiError,
    web::{self, middleware::USER_ID_HEADER, state::AppState},
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "tax-test-boundary";

struct TestApp {
    db: Arc<InMemoryDatabase>,
    router: Router,
    storage: TempDir,
}

fn config(storage_root: &Path) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        db_max_connections: 1,
        log_level: tracing::Level::INFO,
        storage_root: storage_root.to_path_buf(),
        storage_public_url: None,
        session_ttl_hours: 24,
        cleanup_interval_secs: 3600,
        allow_step_regression: false,
        analysis_policy: AnalysisPolicy::ReplaceExisting,
        cors_origin: "http://localhost:3000".to_string(),
        max_upload_bytes: 1024 * 1024,
    }
}

fn app_state(db: Arc<InMemoryDatabase>, config: Config) -> Arc<AppState> {
    let manager = AnalysisSessionManager::new(db, config.manager_config());
    Arc::new(AppState {
        manager,
        blob: Arc::new(LocalBlobAdapter::new(config.storage_root.clone(), None)),
        config: Arc::new(config),
    })
}

fn test_app() -> TestApp {
    let storage = tempfile::tempdir().unwrap();
    let db = Arc::new(InMemoryDatabase::default());
    let router = web::router(app_state(db.clone(), config(storage.path()))).unwrap();
    TestApp {
        db,
        router,
        storage,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn create_session(&self, user: Uuid) -> String {
        let response = self.send(request(Method::POST, "/sessions", Some(user), None)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

fn request(method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// A multipart body; parts with a file name are sent as files.
fn multipart_request(uri: &str, user: Uuid, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/pdf\r\n\r\n",
                    name, file_name
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn stored_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .map(|path| if path.is_dir() { stored_files(&path) } else { 1 })
        .sum()
}

mod identity_tests {
    use super::*;

    #[tokio::test]
    async fn missing_or_malformed_user_header_is_unauthorized() {
        let app = test_app();

        let missing = app.send(request(Method::POST, "/sessions", None, None)).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let malformed = Request::builder()
            .method(Method::GET)
            .uri("/analyses")
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(malformed).await.status(), StatusCode::UNAUTHORIZED);

        assert!(app.db.with(|s| s.sessions.is_empty()));
    }

    #[tokio::test]
    async fn create_session_reads_browser_headers() {
        let app = test_app();
        let user = Uuid::new_v4();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/sessions")
            .header(USER_ID_HEADER, user.to_string())
            .header(header::USER_AGENT, "Mozilla/5.0")
            .header(header::ACCEPT_LANGUAGE, "en-GB,en;q=0.9")
            .body(Body::empty())
            .unwrap();

        let response = app.send(request).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["current_step"], 0);
        assert_eq!(body["total_steps"], 4);
        let session = app
            .db
            .session(&SessionId::new(body["session_id"].as_str().unwrap()));
        assert_eq!(session.user_id, user);
        assert_eq!(session.browser_info.language, "en-GB");
    }

    #[test]
    fn unusable_cors_origin_fails_router_construction() {
        let storage = tempfile::tempdir().unwrap();
        let mut config = config(storage.path());
        config.cors_origin = "http://bad\norigin".to_string();

        let result = web::router(app_state(Arc::new(InMemoryDatabase::default()), config));

        assert!(matches!(result, Err(ApiError::CorsOrigin(_))));
    }
}

mod session_route_tests {
    use super::*;

    #[tokio::test]
    async fn foreign_session_is_forbidden() {
        let app = test_app();
        let session_id = app.create_session(Uuid::new_v4()).await;

        let response = app
            .send(request(
                Method::POST,
                &format!("/sessions/{}/progress", session_id),
                Some(Uuid::new_v4()),
                Some(json!({ "step": 1, "data": {} })),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn expired_session_is_gone() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;
        app.db.with(|s| {
            let session = s.sessions.get_mut(&SessionId::new(session_id.as_str())).unwrap();
            session.expires_at = Utc::now() - Duration::minutes(1);
        });

        let response = app
            .send(request(
                Method::POST,
                &format!("/sessions/{}/progress", session_id),
                Some(user),
                Some(json!({ "step": 1, "data": {} })),
            ))
            .await;

        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn progress_statuses_follow_the_step_table() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;
        let uri = format!("/sessions/{}/progress", session_id);

        let ok = app
            .send(request(Method::POST, &uri, Some(user), Some(json!({ "step": 1 }))))
            .await;
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);

        let skipped = app
            .send(request(Method::POST, &uri, Some(user), Some(json!({ "step": 3 }))))
            .await;
        assert_eq!(skipped.status(), StatusCode::CONFLICT);

        let out_of_range = app
            .send(request(Method::POST, &uri, Some(user), Some(json!({ "step": 9 }))))
            .await;
        assert_eq!(out_of_range.status(), StatusCode::BAD_REQUEST);

        assert_eq!(
            app.db.session(&SessionId::new(session_id)).current_step,
            SessionStep::DocumentsUploaded
        );
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let app = test_app();

        let response = app
            .send(request(
                Method::GET,
                "/sessions/sess_missing",
                Some(Uuid::new_v4()),
                None,
            ))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

mod document_route_tests {
    use super::*;

    #[tokio::test]
    async fn upload_without_file_part_is_rejected() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;

        let response = app
            .send(multipart_request(
                &format!("/sessions/{}/documents", session_id),
                user,
                &[("document_type", None, b"tax_return")],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Missing 'file' part");
    }

    #[tokio::test]
    async fn upload_stores_bytes_and_row() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;

        let response = app
            .send(multipart_request(
                &format!("/sessions/{}/documents", session_id),
                user,
                &[
                    ("document_type", None, b"tax_return"),
                    ("file", Some("q4.pdf"), b"%PDF-1.7"),
                ],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["value"]["file_name"], "q4.pdf");
        assert_eq!(body["value"]["document_type"], "tax_return");
        assert_eq!(stored_files(app.storage.path()), 1);
        assert_eq!(
            app.db
                .session(&SessionId::new(session_id))
                .uploaded_files_count,
            1
        );
    }

    #[tokio::test]
    async fn failed_row_insert_removes_stored_bytes() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;
        app.db
            .with(|s| s.fail.document_names.insert("broken.pdf".to_string()));

        let response = app
            .send(multipart_request(
                &format!("/sessions/{}/documents", session_id),
                user,
                &[("file", Some("broken.pdf"), b"%PDF-1.7")],
            ))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(stored_files(app.storage.path()), 0);
        assert!(app.db.with(|s| s.documents.is_empty()));
    }
}

mod analysis_route_tests {
    use super::*;

    #[tokio::test]
    async fn missing_analysis_is_not_found() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;

        let response = app
            .send(request(
                Method::GET,
                &format!("/sessions/{}/analysis", session_id),
                Some(user),
                None,
            ))
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn saved_analysis_can_be_read_and_deleted_once() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;
        let analysis_uri = format!("/sessions/{}/analysis", session_id);

        let saved = app
            .send(request(
                Method::POST,
                &analysis_uri,
                Some(user),
                Some(json!({
                    "analysis": analysis_payload("Acme Corp", 2024, 1_000_000.0, 210_000.0),
                    "processing_time_seconds": 3.5
                })),
            ))
            .await;
        assert_eq!(saved.status(), StatusCode::CREATED);
        let analysis_id = body_json(saved).await["id"].as_str().unwrap().to_string();

        let fetched = app
            .send(request(Method::GET, &analysis_uri, Some(user), None))
            .await;
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(body_json(fetched).await["company_name"], "Acme Corp");

        let delete_uri = format!("/analyses/{}", analysis_id);
        let stranger = app
            .send(request(Method::DELETE, &delete_uri, Some(Uuid::new_v4()), None))
            .await;
        assert_eq!(stranger.status(), StatusCode::NOT_FOUND);

        let deleted = app
            .send(request(Method::DELETE, &delete_uri, Some(user), None))
            .await;
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let again = app
            .send(request(Method::DELETE, &delete_uri, Some(user), None))
            .await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_and_statistics_are_per_user() {
        let app = test_app();
        let user = Uuid::new_v4();
        let session_id = app.create_session(user).await;
        app.send(request(
            Method::POST,
            &format!("/sessions/{}/analysis", session_id),
            Some(user),
            Some(json!({ "analysis": analysis_payload("Acme Corp", 2024, 100.0, 21.0) })),
        ))
        .await;

        let history = app
            .send(request(Method::GET, "/analyses?limit=5", Some(user), None))
            .await;
        assert_eq!(history.status(), StatusCode::OK);
        assert_eq!(body_json(history).await.as_array().unwrap().len(), 1);

        let stats = app
            .send(request(Method::GET, "/analyses/statistics", Some(Uuid::new_v4()), None))
            .await;
        assert_eq!(stats.status(), StatusCode::OK);
        assert_eq!(body_json(stats).await["value"]["total_analyses"], 0);
    }
}
