//! HTTP front end: routes, session gate, JSON error mapping.
//!
//! ```text
//! GET  /               upload form            (session)
//! GET  /login          login form             (public)
//! POST /api/login      credentials → cookie   (public)
//! POST /api/logout     clear cookie           (public)
//! POST /api/process    multipart upload       (session)
//! GET  /api/download   ?file=<name>           (session)
//! ```

pub mod error;
pub mod gate;
pub mod handlers;

pub use error::ApiError;

use crate::auth::AuthBackend;
use crate::session::CookiePolicy;
use crate::solve::Solver;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;

/// Default request body cap: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub solver: Arc<Solver>,
    pub auth: Arc<dyn AuthBackend>,
    pub cookies: CookiePolicy,
}

impl AppState {
    pub fn new(solver: Arc<Solver>, auth: Arc<dyn AuthBackend>, cookies: CookiePolicy) -> Self {
        Self {
            solver,
            auth,
            cookies,
        }
    }
}

/// Assemble the router with the session gate, panic recovery, body limit
/// and request tracing.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index_page))
        .route("/login", get(handlers::login_page))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/api/login", post(handlers::login))
        .route("/api/logout", post(handlers::logout))
        .route("/api/process", post(handlers::process))
        .route("/api/download", get(handlers::download))
        .layer(middleware::from_fn(gate::require_session))
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, router: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}
