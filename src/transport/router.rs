use crate::compiler::HandlerChain;
use crate::context::HttpContext;
use crate::error::{Result, TrestleError};
use crate::metadata::Method;
use crate::transport::Transport;
use axum::Router;
use axum::body::Body;
use axum::extract::{FromRequestParts, RawPathParams};
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::Service;

/// Collects handler chains into an axum [`Router`].
#[derive(Default)]
pub struct AxumTransport {
    routes: BTreeMap<String, MethodRouter>,
    registered: HashSet<(Method, String)>,
}

impl AxumTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    pub fn into_router(self) -> Router {
        self.routes
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| router.route(&path, methods))
    }
}

impl Transport for AxumTransport {
    fn register(&mut self, method: Method, path: &str, chain: HandlerChain) -> Result<()> {
        let segments = parse_path(path)?;
        if let Some(existing) = self
            .routes
            .keys()
            .find(|existing| conflicts(&parse_axum_path(existing), &segments))
        {
            return Err(TrestleError::configuration(format!(
                "route '{}' conflicts with already registered '{}'",
                path, existing
            )));
        }
        let path = to_axum_path(path);
        if !self.registered.insert((method, path.clone())) {
            return Err(TrestleError::configuration(format!(
                "duplicate route registration: {} {}",
                method, path
            )));
        }
        let methods = self.routes.remove(&path).unwrap_or_default();
        let methods = methods.on_service(method_filter(method), ChainService { chain });
        self.routes.insert(path, methods);
        Ok(())
    }
}

fn method_filter(method: Method) -> MethodFilter {
    match method {
        Method::Get => MethodFilter::GET,
        Method::Post => MethodFilter::POST,
        Method::Put => MethodFilter::PUT,
        Method::Delete => MethodFilter::DELETE,
        Method::Patch => MethodFilter::PATCH,
        Method::Options => MethodFilter::OPTIONS,
        Method::Head => MethodFilter::HEAD,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let parts: Vec<&str> = path.split('/').collect();
    let last = parts.len() - 1;
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let segment = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(param_name(path, name)?)
            } else if let Some(name) = part.strip_prefix('*') {
                if i != last {
                    return Err(TrestleError::configuration(format!(
                        "wildcard '*{}' must be the last segment of '{}'",
                        name, path
                    )));
                }
                Segment::Wildcard(param_name(path, name)?)
            } else if part.contains(['{', '}']) {
                return Err(TrestleError::configuration(format!(
                    "unexpected brace in route segment '{}' of '{}'",
                    part, path
                )));
            } else {
                Segment::Static((*part).to_string())
            };
            Ok(segment)
        })
        .collect()
}

fn param_name(path: &str, name: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TrestleError::configuration(format!(
            "invalid parameter name '{}' in route '{}'",
            name, path
        )));
    }
    Ok(name.to_string())
}

fn parse_axum_path(path: &str) -> Vec<Segment> {
    path.split('/')
        .map(|part| match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(inner) => match inner.strip_prefix('*') {
                Some(name) => Segment::Wildcard(name.to_string()),
                None => Segment::Param(inner.to_string()),
            },
            None => Segment::Static(part.to_string()),
        })
        .collect()
}

/// Two routes conflict when, along their shared prefix, a dynamic segment
/// sits at the same position under a different name or kind.
fn conflicts(existing: &[Segment], candidate: &[Segment]) -> bool {
    for (a, b) in existing.iter().zip(candidate) {
        match (a, b) {
            (Segment::Static(x), Segment::Static(y)) if x == y => continue,
            (Segment::Static(_), _) | (_, Segment::Static(_)) => return false,
            (a, b) if a == b => continue,
            _ => return true,
        }
    }
    false
}

/// `/users/:id/*rest` becomes `/users/{id}/{*rest}`.
fn to_axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{}}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Tower service running one handler chain.
#[derive(Clone)]
struct ChainService {
    chain: HandlerChain,
}

impl Service<Request<Body>> for ChainService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let chain = self.chain.clone();
        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
                Ok(raw) => raw
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
                Err(e) => {
                    tracing::debug!("No path parameters: {}", e);
                    Vec::new()
                }
            };
            match HttpContext::new(parts, params, body) {
                Ok(ctx) => Ok(chain.call(ctx).await),
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Next, from_fn};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn echo_chain() -> HandlerChain {
        HandlerChain::new(vec![from_fn("echo", |ctx: HttpContext, _next: Next| async move {
            let id = ctx.param("id").unwrap_or("-").to_string();
            ctx.send(format!("{} {}", ctx.method(), id))
        })])
    }

    #[test]
    fn converts_parameter_syntax() {
        assert_eq!(to_axum_path("/users/:id"), "/users/{id}");
        assert_eq!(to_axum_path("/files/*rest"), "/files/{*rest}");
        assert_eq!(to_axum_path("/api/users"), "/api/users");
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let mut transport = AxumTransport::new();
        transport.register(Method::Get, "/a", echo_chain()).unwrap();
        transport.register(Method::Post, "/a", echo_chain()).unwrap();
        let err = transport.register(Method::Get, "/a", echo_chain()).unwrap_err();
        assert!(matches!(err, TrestleError::Configuration { .. }));
        assert_eq!(transport.len(), 2);
    }

    #[test]
    fn differently_named_parameters_at_one_position_are_rejected() {
        let mut transport = AxumTransport::new();
        transport.register(Method::Get, "/users/:id", echo_chain()).unwrap();
        let err = transport.register(Method::Delete, "/users/:name", echo_chain()).unwrap_err();
        assert!(matches!(err, TrestleError::Configuration { .. }));
        let err = transport
            .register(Method::Get, "/users/:user_id/posts", echo_chain())
            .unwrap_err();
        assert!(matches!(err, TrestleError::Configuration { .. }));
        let err = transport.register(Method::Get, "/users/*rest", echo_chain()).unwrap_err();
        assert!(matches!(err, TrestleError::Configuration { .. }));

        transport.register(Method::Get, "/users/:id/posts", echo_chain()).unwrap();
        transport.register(Method::Get, "/users/me", echo_chain()).unwrap();
        assert_eq!(transport.len(), 3);
        let _router = transport.into_router();
    }

    #[test]
    fn malformed_parameters_are_rejected() {
        let mut transport = AxumTransport::new();
        for path in ["/users/:", "/files/*", "/files/*rest/tail", "/a/{b}", "/users/:id-x"] {
            let err = transport.register(Method::Get, path, echo_chain()).unwrap_err();
            assert!(matches!(err, TrestleError::Configuration { .. }), "{}", path);
        }
        assert!(transport.is_empty());
    }

    #[tokio::test]
    async fn routes_by_verb_and_path_parameters() {
        let mut transport = AxumTransport::new();
        transport.register(Method::Get, "/users/:id", echo_chain()).unwrap();
        transport.register(Method::Delete, "/users/:id", echo_chain()).unwrap();
        let router = transport.into_router();

        let response = router
            .clone()
            .oneshot(Request::delete("/users/9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"DELETE 9");

        let response = router
            .oneshot(Request::post("/users/9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
