//! HTTP-level tests for the web service.
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`. The
//! model, compiler, rasterizer and auth service are replaced by fakes, so
//! nothing here needs network access or a TeX installation.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mathgen::pipeline::encode::PageImage;
use mathgen::pipeline::llm::{GenerationRequest, ModelReply};
use mathgen::pipeline::repair::brace_deficit;
use mathgen::{
    build_router, AppState, AuthBackend, AuthError, AuthOutcome, CompileError, Compiler,
    CookiePolicy, MathGenError, ModelConfig, OpenRouterClient, Rasterizer, SessionPayload,
    Solver, SolverConfig, VisionModel, TRUNCATION_WARNING,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct ScriptedModel {
    text: String,
    finish: String,
    calls: AtomicUsize,
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn generate(&self, _request: GenerationRequest) -> Result<ModelReply, MathGenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ModelReply {
            text: self.text.clone(),
            finish_reason: Some(self.finish.clone()),
            prompt_tokens: Some(100),
            completion_tokens: Some(50),
        })
    }
}

struct PanickingModel;

#[async_trait]
impl VisionModel for PanickingModel {
    async fn generate(&self, _request: GenerationRequest) -> Result<ModelReply, MathGenError> {
        panic!("model client bug");
    }
}

struct FakeCompiler {
    succeed: bool,
}

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, tex_path: &Path) -> Result<PathBuf, CompileError> {
        if self.succeed {
            let pdf = tex_path.with_extension("pdf");
            tokio::fs::write(&pdf, b"%PDF-1.7 fake").await.unwrap();
            Ok(pdf)
        } else {
            Err(CompileError::Failed {
                program: "xelatex".into(),
                status: "exit status: 1".into(),
                log: "! Undefined control sequence.\nl.12 \\foo".into(),
            })
        }
    }
}

struct OnePage;

#[async_trait]
impl Rasterizer for OnePage {
    async fn rasterize(&self, _: &Path, _: &Path) -> Result<Vec<PageImage>, MathGenError> {
        Ok(vec![PageImage::from_bytes("image/png", b"page")])
    }
}

struct FakeAuth;

#[async_trait]
impl AuthBackend for FakeAuth {
    async fn verify(&self, username: &str, password: &str) -> Result<AuthOutcome, AuthError> {
        match (username, password) {
            ("alice", "secret") => Ok(AuthOutcome::Accepted {
                username: "alice".into(),
                user_id: Some(serde_json::json!(7)),
            }),
            ("down", _) => Err(AuthError::Unavailable("connection refused".into())),
            _ => Ok(AuthOutcome::Rejected {
                status: 401,
                error: "Invalid credentials".into(),
            }),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct TestApp {
    router: Router,
    model: Arc<ScriptedModel>,
    _root: TempDir,
}

fn app_with(text: &str, finish: &str, compiles: bool, max_upload: usize) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let config = SolverConfig::builder()
        .scratch_root(root.path().join("scratch"))
        .download_dir(root.path().join("downloads"))
        .build()
        .unwrap();
    let model = Arc::new(ScriptedModel {
        text: text.into(),
        finish: finish.into(),
        calls: AtomicUsize::new(0),
    });
    let solver = Solver::new(config, model.clone())
        .with_compiler(Arc::new(FakeCompiler { succeed: compiles }))
        .with_rasterizer(Arc::new(OnePage));
    let state = AppState::new(Arc::new(solver), Arc::new(FakeAuth), CookiePolicy::new(false));
    TestApp {
        router: build_router(state, max_upload),
        model,
        _root: root,
    }
}

fn app(text: &str, finish: &str, compiles: bool) -> TestApp {
    app_with(text, finish, compiles, 50 * 1024 * 1024)
}

fn session_cookie() -> String {
    format!(
        "mathgen_session={}",
        SessionPayload::new("alice", None).encode()
    )
}

const BOUNDARY: &str = "mathgen-test-boundary";

/// `(name, Some(file_name) for file parts, content)`.
fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn process_request(parts: &[(&str, Option<&str>, &[u8])], cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/process").header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

fn login_request(body: &str) -> Request<Body> {
    Request::post("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, bytes.to_vec())
}

fn json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

const PDF: &[u8] = b"%PDF-1.4 fake sheet";

// ── Session gate ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn process_without_cookie_is_unauthorized() {
    let app = app("$1$", "stop", true);
    let (status, _, body) = send(
        &app.router,
        process_request(&[("file", Some("sheet.pdf"), PDF)], None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["error"], "Unauthorized");
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pages_without_cookie_redirect_to_login() {
    let app = app("$1$", "stop", true);
    let (status, headers, _) = send(&app.router, get("/", None)).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/login?redirect=%2F");
}

#[tokio::test]
async fn login_page_is_public() {
    let app = app("$1$", "stop", true);
    let (status, headers, body) = send(&app.router, get("/login", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    assert!(String::from_utf8_lossy(&body).contains("/api/login"));
}

#[tokio::test]
async fn index_is_served_with_cookie() {
    let app = app("$1$", "stop", true);
    let cookie = session_cookie();
    let (status, _, body) = send(&app.router, get("/", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("/api/process"));
}

// ── Login ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_sets_session_cookie() {
    let app = app("$1$", "stop", true);
    let (status, headers, body) = send(
        &app.router,
        login_request(r#"{"username":"alice","password":"secret"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["success"], true);
    assert_eq!(body["username"], "alice");

    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("mathgen_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=604800"));

    let value = cookie
        .trim_start_matches("mathgen_session=")
        .split(';')
        .next()
        .unwrap();
    let payload = SessionPayload::decode(value).unwrap();
    assert_eq!(payload.username, "alice");
}

#[tokio::test]
async fn login_relays_rejection() {
    let app = app("$1$", "stop", true);
    let (status, headers, body) = send(
        &app.router,
        login_request(r#"{"username":"alice","password":"wrong"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers.get(header::SET_COOKIE).is_none());
    let body = json(&body);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn login_reports_unavailable_auth_service() {
    let app = app("$1$", "stop", true);
    let (status, _, body) = send(
        &app.router,
        login_request(r#"{"username":"down","password":"x"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["error"], "Authentication service unavailable");
}

#[tokio::test]
async fn login_validates_body() {
    let app = app("$1$", "stop", true);

    let (status, _, body) = send(&app.router, login_request("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Invalid request body");

    let (status, _, body) = send(
        &app.router,
        login_request(r#"{"username":"  ","password":"x"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Username and password are required");
}

#[tokio::test]
async fn logout_clears_cookie() {
    let app = app("$1$", "stop", true);
    let request = Request::post("/api/logout").body(Body::empty()).unwrap();
    let (status, headers, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    let cookie = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("mathgen_session=;"));
    assert!(cookie.contains("Max-Age=0"));
}

// ── Process ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    let app = app("$1$", "stop", true);
    let cookie = session_cookie();
    let (status, _, body) = send(
        &app.router,
        process_request(&[("file", Some("notes.docx"), b"PK")], Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json(&body)["error"],
        "Invalid file type. Please upload PDF or image."
    );
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_file_is_rejected() {
    let app = app("$1$", "stop", true);
    let cookie = session_cookie();
    let (status, _, body) = send(
        &app.router,
        process_request(&[("prompt", None, b"only Q1")], Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "No file provided");
}

#[tokio::test]
async fn compiled_upload_returns_download_links() {
    let app = app("\\section*{Problem 1}\n$x = 2$", "stop", true);
    let cookie = session_cookie();
    let (status, _, body) = send(
        &app.router,
        process_request(
            &[
                ("file", Some("sheet.pdf"), PDF),
                ("detailLevel", None, b"detailed"),
                ("title", None, b"Homework 3"),
            ],
            Some(&cookie),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert!(body.get("warning").is_none());

    let pdf_url = body["pdfUrl"].as_str().unwrap();
    let tex_url = body["texUrl"].as_str().unwrap();
    assert!(pdf_url.starts_with("/api/download?file=solutions_"));
    assert!(pdf_url.ends_with(".pdf"));
    assert!(tex_url.ends_with(".tex"));

    let (status, headers, pdf) = send(&app.router, get(pdf_url, Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"solutions_"));
    assert_eq!(pdf, b"%PDF-1.7 fake");

    let (status, headers, tex) = send(&app.router, get(tex_url, Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let tex = String::from_utf8(tex).unwrap();
    assert!(tex.contains("\\title{Homework 3}"));
    assert!(tex.contains("$x = 2$"));
}

#[tokio::test]
async fn truncated_reply_is_repaired_with_warning() {
    let app = app("\\begin{align}\nx &= \\frac{1", "length", true);
    let cookie = session_cookie();
    let (status, _, body) = send(
        &app.router,
        process_request(&[("file", Some("photo.png"), b"\x89PNG")], Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["warning"], TRUNCATION_WARNING);

    let (_, _, tex) = send(&app.router, get(body["texUrl"].as_str().unwrap(), Some(&cookie))).await;
    let tex = String::from_utf8(tex).unwrap();
    assert_eq!(brace_deficit(&tex), 0);
    assert!(tex.contains("\\end{align}"));
    assert!(tex.trim_end().ends_with("\\end{document}"));
}

#[tokio::test]
async fn compile_failure_returns_source() {
    let app = app("$\\foo$", "stop", false);
    let cookie = session_cookie();
    let (status, _, body) = send(
        &app.router,
        process_request(&[("file", Some("sheet.pdf"), PDF)], Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(&body);
    assert_eq!(body["error"], "LaTeX compilation failed");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("Undefined control sequence"));

    let latex = body["latexCode"].as_str().unwrap();
    let (status, _, tex) = send(&app.router, get(body["texUrl"].as_str().unwrap(), Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(tex).unwrap(), latex);
}

#[tokio::test]
async fn sanitizer_neutralises_shell_escape() {
    let app = app("\\immediate\\write18{rm -rf /}\n$1$", "stop", true);
    let cookie = session_cookie();
    let (_, _, body) = send(
        &app.router,
        process_request(&[("file", Some("sheet.pdf"), PDF)], Some(&cookie)),
    )
    .await;
    let body = json(&body);
    let (_, _, tex) = send(&app.router, get(body["texUrl"].as_str().unwrap(), Some(&cookie))).await;
    let tex = String::from_utf8(tex).unwrap();
    assert!(!tex.contains("\\write18"));
    assert!(tex.contains("% BLOCKED:"));
}

#[tokio::test]
async fn missing_api_key_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let config = SolverConfig::builder()
        .scratch_root(root.path().join("scratch"))
        .download_dir(root.path().join("downloads"))
        .build()
        .unwrap();
    let model = OpenRouterClient::new(ModelConfig::default()).unwrap();
    let solver = Solver::new(config, Arc::new(model)).with_rasterizer(Arc::new(OnePage));
    let state = AppState::new(Arc::new(solver), Arc::new(FakeAuth), CookiePolicy::new(false));
    let router = build_router(state, 1024 * 1024);

    let cookie = session_cookie();
    let (status, _, body) = send(
        &router,
        process_request(&[("file", Some("sheet.pdf"), PDF)], Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Language model API key not configured");
}

#[tokio::test]
async fn handler_panic_becomes_json_500() {
    let root = tempfile::tempdir().unwrap();
    let config = SolverConfig::builder()
        .scratch_root(root.path().join("scratch"))
        .download_dir(root.path().join("downloads"))
        .build()
        .unwrap();
    let solver = Solver::new(config, Arc::new(PanickingModel)).with_rasterizer(Arc::new(OnePage));
    let state = AppState::new(Arc::new(solver), Arc::new(FakeAuth), CookiePolicy::new(false));
    let router = build_router(state, 1024 * 1024);

    let cookie = session_cookie();
    let (status, _, body) = send(
        &router,
        process_request(&[("file", Some("sheet.pdf"), PDF)], Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json(&body)["error"], "Internal server error");

    // The service keeps answering after the panic.
    let (status, _, _) = send(&router, get("/login", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = app_with("$1$", "stop", true, 1024);
    let cookie = session_cookie();
    let big = vec![b'x'; 8 * 1024];
    let (status, _, _) = send(
        &app.router,
        process_request(&[("file", Some("sheet.pdf"), &big)], Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
}

// ── Download ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn download_rejects_traversal_and_bad_names() {
    let app = app("$1$", "stop", true);
    let cookie = session_cookie();

    for uri in [
        "/api/download?file=..%2F..%2Fetc%2Fpasswd",
        "/api/download?file=solutions_1.sh",
        "/api/download?file=sub%5Csolutions_1.pdf",
    ] {
        let (status, _, body) = send(&app.router, get(uri, Some(&cookie))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json(&body)["error"], "Invalid file name", "{uri}");
    }

    let (status, _, body) = send(&app.router, get("/api/download", Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "File name required");
}

#[tokio::test]
async fn download_of_unknown_file_is_not_found() {
    let app = app("$1$", "stop", true);
    let cookie = session_cookie();
    let (status, _, body) = send(
        &app.router,
        get("/api/download?file=solutions_1.pdf", Some(&cookie)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "File not found");
}

#[tokio::test]
async fn download_without_cookie_is_unauthorized() {
    let app = app("$1$", "stop", true);
    let (status, _, _) = send(&app.router, get("/api/download?file=solutions_1.pdf", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
