use crate::context::HttpContext;
use crate::error::TrestleError;
use async_trait::async_trait;
use axum::response::Response;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

pub mod body_parser;
mod logging;

pub use logging::RequestLogger;

/// Represents the rest of the handler chain.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>) -> Self {
        Self { chain, index: 0 }
    }

    /// Hand the context to the next middleware.
    pub async fn run(self, ctx: HttpContext) -> Response {
        let Some(current) = self.chain.get(self.index).cloned() else {
            return ctx.fail(TrestleError::configuration(
                "handler chain ended without producing a response",
            ));
        };
        let next = Next {
            chain: Arc::clone(&self.chain),
            index: self.index + 1,
        };
        current.handle(ctx, next).await
    }

    /// Number of handlers left after this point, final handler included.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }
}

/// The Middleware trait
///
/// Middleware sees the request context before the action runs and the
/// response after it returns. Returning without calling `next.run` ends the
/// chain early.
///
/// # Example
/// ```ignore
/// struct Auth;
///
/// #[async_trait]
/// impl Middleware for Auth {
///     async fn handle(&self, ctx: HttpContext, next: Next) -> Response {
///         if ctx.header("authorization").is_none() {
///             ctx.set_status(StatusCode::UNAUTHORIZED);
///             return ctx.send("unauthorized");
///         }
///         next.run(ctx).await
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: HttpContext, next: Next) -> Response;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

struct FnMiddleware<F, Fut> {
    name: &'static str,
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F, Fut>
where
    F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    async fn handle(&self, ctx: HttpContext, next: Next) -> Response {
        (self.f)(ctx, next).await
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Build a middleware from an async closure.
pub fn from_fn<F, Fut>(name: &'static str, f: F) -> Arc<dyn Middleware>
where
    F: Fn(HttpContext, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(FnMiddleware {
        name,
        f,
        _future: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRequest;
    use axum::http::StatusCode;

    fn chain(list: Vec<Arc<dyn Middleware>>) -> Next {
        Next::new(Arc::from(list))
    }

    #[tokio::test]
    async fn runs_in_order_and_can_short_circuit() {
        let tag = from_fn("tag", |ctx: HttpContext, next: Next| async move {
            let _ = ctx.insert_header("x-seen", "tag");
            next.run(ctx).await
        });
        let deny = from_fn("deny", |ctx: HttpContext, _next: Next| async move {
            ctx.set_status(StatusCode::FORBIDDEN);
            ctx.send("denied")
        });
        let unreachable = from_fn("unreachable", |ctx: HttpContext, _next: Next| async move {
            ctx.send("should not run")
        });

        let ctx = TestRequest::get("/").into_context().unwrap();
        let response = chain(vec![tag, deny, unreachable]).run(ctx).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-seen"], "tag");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"denied");
    }

    #[tokio::test]
    async fn exhausted_chain_is_a_server_error() {
        let ctx = TestRequest::get("/").into_context().unwrap();
        let response = chain(Vec::new()).run(ctx).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn closure_middleware_keeps_its_name() {
        let mw = from_fn("audit", |ctx: HttpContext, next: Next| next.run(ctx));
        assert_eq!(mw.name(), "audit");
        assert!(RequestLogger.name().ends_with("RequestLogger"));
    }
}
