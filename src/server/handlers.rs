use crate::auth::{AuthError, AuthOutcome};
use crate::config::{DetailLevel, DocumentInfo, SolutionLanguage};
use crate::downloads::{content_type_for, download_url, DownloadStore};
use crate::output::Artifacts;
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::session::{extract_session_cookie, SessionPayload};
use crate::solve::SolveRequest;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ── Pages ────────────────────────────────────────────────────────────────────

pub async fn index_page() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}

pub async fn login_page() -> Html<&'static str> {
    Html(include_str!("../../assets/login.html"))
}

pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ── Login / logout ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    fn failure(status: StatusCode, error: impl Into<String>) -> Response {
        (
            status,
            Json(LoginResponse {
                success: false,
                username: None,
                error: Some(error.into()),
            }),
        )
            .into_response()
    }
}

/// Exchange credentials with the auth service for a session cookie.
pub async fn login(State(state): State<AppState>, body: Bytes) -> Response {
    let Ok(req) = serde_json::from_slice::<LoginRequest>(&body) else {
        return LoginResponse::failure(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    let username = req.username.trim();
    let password = req.password.trim();
    if username.is_empty() || password.is_empty() {
        return LoginResponse::failure(
            StatusCode::BAD_REQUEST,
            "Username and password are required",
        );
    }

    match state.auth.verify(username, password).await {
        Ok(AuthOutcome::Accepted { username, user_id }) => {
            info!("Login succeeded for {}", username);
            let cookie = state
                .cookies
                .session_cookie(&SessionPayload::new(username.clone(), user_id));
            (
                [(header::SET_COOKIE, cookie)],
                Json(LoginResponse {
                    success: true,
                    username: Some(username),
                    error: None,
                }),
            )
                .into_response()
        }
        Ok(AuthOutcome::Rejected { status, error }) => {
            warn!("Login rejected for {} ({})", username, status);
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::UNAUTHORIZED);
            LoginResponse::failure(status, error)
        }
        Err(e @ AuthError::Unavailable(_)) => {
            error!("Login failed: {:?}", e);
            LoginResponse::failure(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

pub async fn logout(State(state): State<AppState>) -> Response {
    (
        [(header::SET_COOKIE, state.cookies.clear_cookie())],
        Json(LoginResponse {
            success: true,
            username: None,
            error: None,
        }),
    )
        .into_response()
}

// ── Process ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub pdf_url: String,
    pub tex_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Fields read from the upload form.
#[derive(Debug, Default)]
struct ProcessForm {
    file: Option<(String, Vec<u8>)>,
    prompt: Option<String>,
    detail_level: Option<String>,
    language: Option<String>,
    title: Option<String>,
    author: Option<String>,
    course: Option<String>,
}

fn read_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!("Upload too large: {}", e.body_text()))
    } else {
        ApiError::BadRequest(format!("Failed to read upload: {}", e.body_text()))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<ProcessForm, ApiError> {
    let mut form = ProcessForm::default();
    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("").to_string();
            let bytes = field.bytes().await.map_err(read_error)?;
            if !file_name.is_empty() {
                form.file = Some((file_name, bytes.to_vec()));
            }
            continue;
        }

        let slot = match name.as_str() {
            "prompt" => &mut form.prompt,
            "detailLevel" => &mut form.detail_level,
            "language" => &mut form.language,
            "title" => &mut form.title,
            "author" => &mut form.author,
            "course" => &mut form.course,
            _ => continue,
        };
        *slot = Some(field.text().await.map_err(read_error)?);
    }
    Ok(form)
}

/// Upload a sheet and get download links for the generated solutions.
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    if extract_session_cookie(&headers).is_none() {
        return Err(ApiError::Unauthorized);
    }

    let multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let form = read_form(multipart).await?;
    let (file_name, bytes) = form
        .file
        .ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    let request = SolveRequest {
        file_name,
        bytes,
        prompt: form.prompt,
        detail: DetailLevel::from_form(form.detail_level.as_deref()),
        language: SolutionLanguage::from_form(form.language.as_deref()),
        info: DocumentInfo::from_form(form.title, form.author, form.course),
    };

    let output = state.solver.solve(request).await?;
    let warning = output.warning().map(str::to_string);
    match output.artifacts {
        Artifacts::Compiled { pdf_file, tex_file } => Ok(Json(ProcessResponse {
            pdf_url: download_url(&pdf_file),
            tex_url: download_url(&tex_file),
            warning,
        })),
        Artifacts::SourceOnly { tex_file, error } => Err(ApiError::CompileFailed {
            details: error.details(),
            latex_code: output.latex,
            tex_url: download_url(&tex_file),
        }),
    }
}

// ── Download ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file: Option<String>,
}

/// Serve a published file as an attachment.
pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    if extract_session_cookie(&headers).is_none() {
        return Err(ApiError::Unauthorized);
    }

    let name = DownloadStore::validate_name(query.file.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let bytes = state
        .solver
        .store()
        .read(name)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read file: {}", e)))?
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(name).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
