use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

/// Assets compiled into the binary, keyed by their path under `/static/`.
static ASSETS: &[(&str, &str)] = &[
    ("index.html", include_str!("../../static/index.html")),
    ("app.js", include_str!("../../static/app.js")),
    ("style.css", include_str!("../../static/style.css")),
];

/// GET /: the dashboard lives under /static.
pub async fn root_redirect() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/static/index.html")]).into_response()
}

/// GET /static/{*path}: serve a bundled asset.
pub async fn static_handler(Path(path): Path<String>) -> Response {
    match lookup(&path) {
        Some(body) => ([(header::CONTENT_TYPE, content_type(&path))], body).into_response(),
        None => {
            warn!(path = %path, "unknown static asset");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn lookup(path: &str) -> Option<&'static str> {
    let path = path.trim_start_matches('/');
    ASSETS
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, body)| *body)
}

fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
