use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Logs every request once it completes.
///
/// Only the path is recorded: callback query strings carry authorization
/// codes.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        tracing::error!(
            %method,
            %path,
            status = status.as_u16(),
            duration_ms,
            "request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            %method,
            %path,
            status = status.as_u16(),
            duration_ms,
            "request completed with client error"
        );
    } else {
        tracing::info!(
            %method,
            %path,
            status = status.as_u16(),
            duration_ms,
            "request completed"
        );
    }

    response
}
