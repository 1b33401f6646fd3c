use crate::context::HttpContext;
use crate::middleware::{Middleware, Next};
use async_trait::async_trait;
use axum::response::Response;
use std::time::Instant;

/// A middleware that logs request timing and status
#[derive(Clone, Default)]
pub struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, ctx: HttpContext, next: Next) -> Response {
        let method = ctx.method().clone();
        let uri = ctx.uri().clone();
        let request_id = ctx.request_id();
        let start = Instant::now();

        tracing::info!(%request_id, "--> {} {}", method, uri);
        let response = next.run(ctx).await;
        let status = response.status();
        if status.is_server_error() {
            tracing::error!(%request_id, "<-- {} {} {} {:?}", method, uri, status, start.elapsed());
        } else {
            tracing::info!(%request_id, "<-- {} {} {} {:?}", method, uri, status, start.elapsed());
        }
        response
    }
}
