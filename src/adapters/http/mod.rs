//! Inbound HTTP adapter.
//!
//! - `GET /thumb?url=<video_url>`: the GIF preview for a video
//! - `GET /healthz`: liveness
//! - `GET /`: banner

mod health;
mod thumb;

use crate::application::ThumbnailService;
use crate::config::Config;
use crate::error::{InputError, ThumbError};
use crate::ports::runner::CommandRunner;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub struct AppState<R> {
    pub config: Arc<Config>,
    pub service: Arc<ThumbnailService<R>>,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            service: self.service.clone(),
        }
    }
}

pub fn router<R: CommandRunner + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/", get(health::index))
        .route("/healthz", get(health::healthz))
        .route("/thumb", get(thumb::handle::<R>))
        .with_state(state)
}

/// Plain-text error response: `"<code> <reason>\n\n<detail>"`.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    detail: String,
}

impl HttpError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<ThumbError> for HttpError {
    fn from(err: ThumbError) -> Self {
        match &err {
            ThumbError::InvalidInput(InputError::BadUrl(_)) => {
                HttpError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            ThumbError::InvalidInput(InputError::HostNotAllowed(_)) => {
                HttpError::new(StatusCode::FORBIDDEN, err.to_string())
            }
            ThumbError::Cancelled => {
                HttpError::new(StatusCode::GATEWAY_TIMEOUT, "timed out creating gif")
            }
            _ => HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "error creating gif"),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = format!(
            "{} {}\n\n{}",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or_default(),
            self.detail
        );
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
