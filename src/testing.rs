//! Helpers for exercising controllers without a socket.

use crate::compiler::HandlerChain;
use crate::context::HttpContext;
use crate::error::Result;
use crate::metadata::Method;
use crate::middleware::Middleware;
use crate::transport::Transport;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use serde::Serialize;
use std::sync::Arc;

/// One captured `(verb, path, chain)` registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub method: Method,
    pub path: String,
    pub chain: HandlerChain,
}

/// A transport that records registrations instead of serving them.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    registrations: Vec<Registration>,
}

impl RecordingTransport {
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    /// The registration matching `method` and `path`, with its path
    /// parameters. Static segments win over `:name` segments.
    pub fn find(&self, method: Method, path: &str) -> Option<(&Registration, Vec<(String, String)>)> {
        self.registrations
            .iter()
            .filter(|r| r.method == method)
            .filter_map(|r| match_path(&r.path, path).map(|params| (r, params)))
            .min_by_key(|(_, params)| params.len())
    }
}

impl Transport for RecordingTransport {
    fn register(&mut self, method: Method, path: &str, chain: HandlerChain) -> Result<()> {
        self.registrations.push(Registration {
            method,
            path: path.to_string(),
            chain,
        });
        Ok(())
    }
}

fn match_path(pattern: &str, path: &str) -> Option<Vec<(String, String)>> {
    let expected: Vec<&str> = pattern.split('/').collect();
    let actual: Vec<&str> = path.split('/').collect();
    if expected.len() != actual.len() {
        return None;
    }
    let mut params = Vec::new();
    for (want, got) in expected.iter().zip(actual.iter()) {
        match want.strip_prefix(':') {
            Some(name) if !got.is_empty() => params.push((name.to_string(), got.to_string())),
            Some(_) => return None,
            None if want == got => {}
            None => return None,
        }
    }
    Some(params)
}

/// A collected response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    async fn collect(response: axum::response::Response) -> Self {
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
        Self {
            status: parts.status,
            headers: parts.headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Builder for a request context.
///
/// ```
/// use trestle::testing::TestRequest;
///
/// let ctx = TestRequest::get("/users/7?verbose=true")
///     .param("id", "7")
///     .into_context()
///     .unwrap();
/// assert_eq!(ctx.param("id"), Some("7"));
/// assert_eq!(ctx.query("verbose"), Some("true"));
/// ```
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    params: Vec<(String, String)>,
    body: Body,
}

impl TestRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
            params: Vec::new(),
            body: Body::empty(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::Get, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::Post, uri)
    }

    pub fn put(uri: &str) -> Self {
        Self::new(Method::Put, uri)
    }

    pub fn delete(uri: &str) -> Self {
        Self::new(Method::Delete, uri)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// JSON body with a matching content type.
    pub fn json<T: Serialize>(self, value: &T) -> Self {
        let payload = serde_json::to_string(value).unwrap_or_default();
        self.header("content-type", "application/json").body(payload)
    }

    pub fn into_context(self) -> Result<HttpContext> {
        let mut builder = Request::builder()
            .method(axum::http::Method::from(self.method))
            .uri(&self.uri);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(self.body).map_err(|e| {
            crate::error::TrestleError::invalid_parameter("request", e)
        })?;
        HttpContext::from_request(request, self.params)
    }

    /// Run the request through `chain`.
    pub async fn send(self, chain: &HandlerChain) -> TestResponse {
        match self.into_context() {
            Ok(ctx) => TestResponse::collect(chain.call(ctx).await).await,
            Err(e) => TestResponse::collect(axum::response::IntoResponse::into_response(e)).await,
        }
    }

    /// Run the request through ad-hoc middleware.
    pub async fn send_through(self, handlers: Vec<Arc<dyn Middleware>>) -> TestResponse {
        self.send(&HandlerChain::new(handlers)).await
    }

    /// Route the request among `transport`'s registrations. Unmatched
    /// requests get 404.
    pub async fn dispatch(mut self, transport: &RecordingTransport) -> TestResponse {
        let path = self.uri.split('?').next().unwrap_or("").to_string();
        match transport.find(self.method, &path) {
            Some((registration, params)) => {
                self.params.extend(params);
                self.send(&registration.chain).await
            }
            None => TestResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: String::new(),
            },
        }
    }
}
