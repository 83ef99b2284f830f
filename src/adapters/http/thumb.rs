use super::{AppState, HttpError};
use crate::config::Config;
use crate::error::{InputError, ThumbError};
use crate::ports::runner::CommandRunner;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct ThumbQuery {
    pub url: Option<String>,
}

/// Handler for `GET /thumb?url=<video_url>`
pub async fn handle<R: CommandRunner + 'static>(
    State(state): State<AppState<R>>,
    Query(query): Query<ThumbQuery>,
) -> Result<Response, HttpError> {
    let url = source_url(&state.config, query.url.as_deref())?;

    // Root of every derived token in the run. Cancelled when the client goes
    // away (this future is dropped) or the request deadline passes.
    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();
    cancel_after(&token, state.config.request_timeout());

    let delivery = state.service.thumbnail(&token, &url).await?;
    match delivery.path() {
        Some(path) => serve_gif(path).await,
        None => Err(HttpError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "thumbnail is still being generated, retry later",
        )),
    }
}

/// Parses the `url` parameter and checks its host against the allow-list.
pub fn source_url(config: &Config, raw: Option<&str>) -> Result<Url, ThumbError> {
    let raw = raw
        .filter(|s| !s.is_empty())
        .ok_or_else(|| InputError::BadUrl("missing url parameter".to_string()))?;

    let url = Url::parse(raw).map_err(|e| InputError::BadUrl(e.to_string()))?;

    let host = host_with_port(&url);
    if !config.is_host_allowed(&host) {
        return Err(InputError::HostNotAllowed(host).into());
    }
    Ok(url)
}

fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn cancel_after(token: &CancellationToken, timeout: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(timeout) => token.cancel(),
        }
    });
}

async fn serve_gif(path: &Path) -> Result<Response, HttpError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/gif")], bytes).into_response()),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read gif");
            Err(HttpError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "error reading gif",
            ))
        }
    }
}
