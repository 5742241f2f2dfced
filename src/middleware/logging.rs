use axum::{extract::Request, middleware::Next, response::Response};

pub async fn log_request_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    tracing::info!(method = %method, uri = %uri, "incoming HTTP request");

    next.run(request).await
}
