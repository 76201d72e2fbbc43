#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! The upload server: accepts student notebook uploads, dispatches them for
//! grading (over the message queue, or inline in combined mode), listens for
//! reports and serves them on the web.

mod auth;
pub mod config;
mod error;
mod handlers;
pub mod listener;
mod templates;

pub use config::{Config, OidcEndpoints};
pub use error::ServerError;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::Key;
use nbgrade_grader::Autograder;
use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    time::Instant,
};

/// Configures the behavior of the web server.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// The public base URL of this server, used to construct callback URLs.
    pub server_url: String,
    /// Directory for uploaded notebooks and reports, served on /uploads.
    pub upload_dir: PathBuf,
    /// Directory exposed at /static, when set.
    pub static_dir: Option<PathBuf>,
    /// Whether cross-origin requests are allowed.
    pub allow_cors: bool,
    /// Enables the OpenID Connect endpoints and authentication checks.
    pub use_openid: bool,
    /// Users authorized to use the service; empty means authentication only.
    pub allowed_users: HashSet<String>,
    pub client_id: String,
    pub client_secret: String,
    pub hash_salt: String,
    pub secure_cookie: bool,
    pub oidc: Option<OidcEndpoints>,
    /// Mounted bucket directory for submission/report mirroring.
    pub log_bucket: Option<PathBuf>,
}

pub struct ServerState {
    pub opts: Options,
    /// Set in combined mode; grading runs in-process.
    pub grader: Option<Autograder>,
    /// Set in async mode; uploads are posted to the autograde queue.
    pub queue_sender: Option<mpsc::Sender<Vec<u8>>>,
    // first-request times backing the polling page's self-backoff; entries
    // are hints, last-write-wins is fine
    report_timestamp: Mutex<HashMap<String, Instant>>,
    http: reqwest::Client,
    // random value matching authentication callbacks to this process
    oauth_state: String,
}

#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<ServerState>,
    key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Key {
        state.key.clone()
    }
}

impl AppState {
    /// Builds the shared state. The cookie key is derived from the
    /// configured key material; without it a random key is generated, which
    /// invalidates sessions across restarts.
    pub fn new(
        opts: Options,
        cookie_key_material: &str,
        grader: Option<Autograder>,
        queue_sender: Option<mpsc::Sender<Vec<u8>>>,
    ) -> Self {
        let key = if cookie_key_material.len() >= 32 {
            Key::derive_from(cookie_key_material.as_bytes())
        } else {
            if opts.use_openid {
                log::warn!("COOKIE_AUTH_KEY/COOKIE_ENCRYPT_KEY not set, generating a random key");
            }
            Key::generate()
        };
        Self {
            inner: Arc::new(ServerState {
                opts,
                grader,
                queue_sender,
                report_timestamp: Mutex::new(HashMap::new()),
                http: reqwest::Client::new(),
                oauth_state: uuid::Uuid::new_v4().to_string(),
            }),
            key,
        }
    }
}

/// Builds the HTTP surface over the given state.
pub fn router(state: AppState) -> Router {
    use tower_http::services::ServeDir;

    let mut router = Router::new()
        .route("/", get(handlers::upload_form))
        .route(
            "/upload",
            axum::routing::post(handlers::handle_upload).options(handlers::handle_upload_options),
        )
        .route("/report/{submission_id}", get(handlers::handle_report))
        .route("/favicon.ico", get(handlers::favicon));
    if state.inner.opts.use_openid {
        router = router
            .route("/login", get(auth::handle_login))
            .route("/callback", get(auth::handle_callback))
            .route("/logout", get(auth::handle_logout))
            .route("/profile", get(auth::handle_profile));
    }
    router = router.nest_service(
        "/uploads",
        ServeDir::new(&state.inner.opts.upload_dir),
    );
    if let Some(static_dir) = &state.inner.opts.static_dir {
        log::info!(
            "registering static file server on /static from {}",
            static_dir.display()
        );
        router = router.nest_service("/static", ServeDir::new(static_dir));
    }
    router
        // the 1 MiB submission cap is checked in the handler so oversized
        // uploads get the documented error rather than a transport reject
        .layer(DefaultBodyLimit::max(handlers::MAX_UPLOAD_SIZE * 2))
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::util::ServiceExt;

    fn test_state(upload_dir: PathBuf) -> AppState {
        let opts = Options {
            server_url: "http://localhost:8000".to_string(),
            upload_dir,
            ..Default::default()
        };
        AppState::new(opts, "", None, None)
    }

    async fn body_of(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn serves_upload_form() {
        let temp = tempfile::tempdir().unwrap();
        let app = router(test_state(temp.path().to_path_buf()));
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = body_of(response).await;
        assert!(body.contains("multipart/form-data"));
        assert!(body.contains("name=\"notebook\""));
    }

    #[tokio::test]
    async fn missing_report_serves_placeholder() {
        let temp = tempfile::tempdir().unwrap();
        let app = router(test_state(temp.path().to_path_buf()));
        let response = app
            .oneshot(
                Request::get("/report/no-such-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = body_of(response).await;
        assert!(body.contains("Please wait"));
        assert!(body.contains("location.reload"));
    }

    #[tokio::test]
    async fn existing_report_renders_sorted_exercises() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(
            temp.path().join("abc.txt"),
            r#"{
                "submission_id": "abc",
                "e2": {"report": "<p>two</p>"},
                "e1": {"report": "<p>one</p>"}
            }"#,
        )
        .unwrap();
        let app = router(test_state(temp.path().to_path_buf()));
        let response = app
            .oneshot(Request::get("/report/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = body_of(response).await;
        let e1 = body.find("<p>one</p>").unwrap();
        let e2 = body.find("<p>two</p>").unwrap();
        assert!(e1 < e2);
    }

    #[tokio::test]
    async fn upload_requires_login_when_auth_enabled() {
        let temp = tempfile::tempdir().unwrap();
        let mut opts = Options {
            server_url: "http://localhost:8000".to_string(),
            upload_dir: temp.path().to_path_buf(),
            use_openid: true,
            ..Default::default()
        };
        opts.oidc = Some(OidcEndpoints {
            auth: "https://idp.example.com/auth".to_string(),
            token: "https://idp.example.com/token".to_string(),
            userinfo: "https://idp.example.com/userinfo".to_string(),
        });
        let app = router(AppState::new(opts, "", None, None));
        let response = app
            .oneshot(
                Request::post("/upload")
                    .header("content-type", "multipart/form-data; boundary=x")
                    .body(Body::from("--x--\r\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        let body = body_of(response).await;
        assert!(body.contains("/login"));
        // no submission file was written
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    fn multipart_body(boundary: &str, contents: &[u8]) -> Body {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"notebook\"; filename=\"nb.ipynb\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Body::from(body)
    }

    #[tokio::test]
    async fn upload_dispatches_to_queue() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let opts = Options {
            server_url: "http://localhost:8000".to_string(),
            upload_dir: temp.path().to_path_buf(),
            allow_cors: true,
            ..Default::default()
        };
        let app = router(AppState::new(opts, "", None, Some(tx)));

        let notebook = br#"{"nbformat": 4, "cells": []}"#;
        let response = app
            .oneshot(
                Request::post("/upload")
                    .header("origin", "http://notebook.example.com")
                    .header(
                        "content-type",
                        "multipart/form-data; boundary=XBOUNDARY",
                    )
                    .body(multipart_body("XBOUNDARY", notebook))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        // the response carries the report link both ways
        let report_url = response
            .headers()
            .get("x-report-url")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(report_url.starts_with("/report/"));
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "http://notebook.example.com"
        );
        let body = body_of(response).await;
        assert!(body.contains(&report_url));

        // the raw upload was persisted
        let uploaded = std::fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.path().extension().is_some_and(|x| x == "ipynb"))
            .expect("no submission file written");
        assert_eq!(std::fs::read(uploaded.path()).unwrap(), notebook);

        // the queued copy has the identity injected
        let queued = rx.try_recv().expect("nothing posted to the queue");
        let data: serde_json::Value = serde_json::from_slice(&queued).unwrap();
        let submission_id = data["metadata"]["submission_id"].as_str().unwrap();
        assert_eq!(report_url, format!("/report/{submission_id}"));
        assert_eq!(data["metadata"]["user_hash"], "unknown");
        assert!(data["metadata"]["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_without_a_file() {
        let temp = tempfile::tempdir().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let opts = Options {
            server_url: "http://localhost:8000".to_string(),
            upload_dir: temp.path().to_path_buf(),
            ..Default::default()
        };
        let app = router(AppState::new(opts, "", None, Some(tx)));

        let huge = vec![b' '; (1 << 20) + 1];
        let response = app
            .oneshot(
                Request::post("/upload")
                    .header(
                        "content-type",
                        "multipart/form-data; boundary=XBOUNDARY",
                    )
                    .body(multipart_body("XBOUNDARY", &huge))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_server_error());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn upload_preflight_advertises_post() {
        let temp = tempfile::tempdir().unwrap();
        let opts = Options {
            upload_dir: temp.path().to_path_buf(),
            allow_cors: true,
            ..Default::default()
        };
        let app = router(AppState::new(opts, "", None, None));
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/upload")
                    .header("origin", "http://notebook.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-methods")
                .unwrap(),
            "POST"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn serves_favicon() {
        let temp = tempfile::tempdir().unwrap();
        let app = router(test_state(temp.path().to_path_buf()));
        let response = app
            .oneshot(Request::get("/favicon.ico").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "image/x-icon"
        );
    }
}
