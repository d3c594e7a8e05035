use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;

use crate::{
    error::ReportError,
    filters::PageQuery,
    pages::{MicrogridInfo, NavEntry, Page, PageOutput},
    service::ReportService,
    session::DEFAULT_SESSION,
};

pub const SESSION_HEADER: &str = "x-session-id";

pub struct AppState {
    pub service: Arc<ReportService>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = match &self {
            ReportError::InvalidRange(_) | ReportError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            ReportError::UnknownMicrogrid(_) | ReportError::UnknownPage(_) => StatusCode::NOT_FOUND,
            ReportError::Auth(_) | ReportError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/microgrids", get(list_microgrids))
        .route("/", get(render_default_page))
        .route("/pages", get(list_pages))
        .route("/pages/:key", get(render_page))
        .route("/sessions/:id", delete(end_session))
        .with_state(state)
}

fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_microgrids(State(state): State<Arc<AppState>>) -> Json<Vec<MicrogridInfo>> {
    Json(
        state
            .service
            .microgrids()
            .iter()
            .map(MicrogridInfo::from)
            .collect(),
    )
}

async fn list_pages() -> Json<Vec<NavEntry>> {
    Json(Page::navigation())
}

async fn render_default_page(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageOutput>, ReportError> {
    render(&state, Page::resolve(None), &headers, query).await
}

async fn render_page(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    headers: HeaderMap,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageOutput>, ReportError> {
    render(&state, Page::resolve(Some(&key)), &headers, query).await
}

async fn render(
    state: &AppState,
    page: Page,
    headers: &HeaderMap,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PageOutput>, ReportError> {
    let Query(query) = query.map_err(|e| ReportError::InvalidFilter(e.body_text()))?;
    let session = state.service.session(&session_id(headers));

    match page.render(&session, &state.service, &query).await {
        Ok(output) => Ok(Json(output)),
        Err(e) => {
            tracing::warn!(
                page = page.key(),
                session = %session.id(),
                kind = e.kind(),
                error = %e,
                "page render failed"
            );
            Err(e)
        }
    }
}

async fn end_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    if state.service.end_session(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_header_defaults_when_missing_or_blank() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_id(&headers), "default");

        headers.insert(SESSION_HEADER, "  ".parse().unwrap());
        assert_eq!(session_id(&headers), "default");

        headers.insert(SESSION_HEADER, "operator-7".parse().unwrap());
        assert_eq!(session_id(&headers), "operator-7");
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases = [
            (ReportError::InvalidFilter("x".into()), StatusCode::BAD_REQUEST),
            (ReportError::InvalidRange("x".into()), StatusCode::BAD_REQUEST),
            (ReportError::UnknownMicrogrid(3), StatusCode::NOT_FOUND),
            (ReportError::UnknownPage("x".into()), StatusCode::NOT_FOUND),
            (ReportError::Auth("x".into()), StatusCode::BAD_GATEWAY),
            (
                ReportError::Upstream {
                    attempts: 3,
                    detail: "x".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
