use axum::http::header;
use axum::response::IntoResponse;

const BANNER: &str = "gifthumb\n\nGET /thumb?url=<video_url>\n";

/// Handler for `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "ok")
}

/// Handler for `GET /`
pub async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], BANNER)
}
