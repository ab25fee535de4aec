//! Access control applied ahead of every route.

use crate::server::error::ApiError;
use crate::session::extract_session_cookie;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

const PUBLIC_PATHS: &[&str] = &["/login", "/api/login", "/api/logout", "/favicon.ico"];
const PUBLIC_PREFIXES: &[&str] = &["/_next", "/static", "/assets"];

pub const LOGIN_PAGE: &str = "/login";

/// Paths reachable without a session.
pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
        || PUBLIC_PREFIXES
            .iter()
            .any(|p| path == *p || path.strip_prefix(p).is_some_and(|rest| rest.starts_with('/')))
}

fn is_api(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// `/login?redirect=<target>`, with the target percent-encoded.
pub fn login_redirect(target: &str) -> String {
    match reqwest::Url::parse("http://localhost/login") {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("redirect", target);
            match url.query() {
                Some(q) => format!("{LOGIN_PAGE}?{q}"),
                None => LOGIN_PAGE.to_string(),
            }
        }
        Err(_) => LOGIN_PAGE.to_string(),
    }
}

/// Let public paths and requests with a session cookie through. Otherwise
/// API paths get 401 JSON and pages are redirected to the login form.
pub async fn require_session(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    if is_public(path) || extract_session_cookie(request.headers()).is_some() {
        return next.run(request).await;
    }

    if is_api(path) {
        debug!("No session for API path {}", path);
        return ApiError::Unauthorized.into_response();
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(path);
    debug!("No session for page {}, redirecting to login", target);
    Redirect::temporary(&login_redirect(target)).into_response()
}
