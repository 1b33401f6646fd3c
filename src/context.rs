//! Per-request context handed to middleware, pipes and actions.

use crate::error::{Result, TrestleError};
use crate::metadata::ParamType;
use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, request};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A file received through a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Result of the body parser that ran for this request, if any.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Unparsed,
    Json(Value),
    Form(Value),
    Text(String),
    Raw(Bytes),
    Multipart {
        fields: Map<String, Value>,
        files: Vec<UploadedFile>,
    },
}

#[derive(Debug, Default)]
struct ResponseOverrides {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

/// Writes the outgoing response for one request.
///
/// Shares status/header overrides with the [`HttpContext`] it came from, so an
/// action that consumed its context can still have its overrides applied.
#[derive(Clone)]
pub struct Responder {
    request_id: Uuid,
    overrides: Arc<Mutex<ResponseOverrides>>,
}

impl Responder {
    pub fn send(&self, status: StatusCode, content_type: &'static str, payload: impl Into<Body>) -> Response {
        let mut response = Response::new(payload.into());
        let overrides = self.overrides.lock().unwrap_or_else(PoisonError::into_inner);
        *response.status_mut() = overrides.status.unwrap_or(status);
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.tag(headers);
        for (name, value) in overrides.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        response
    }

    /// Error response for this request, tagged with the request id.
    pub fn fail(&self, error: TrestleError) -> Response {
        let mut response = error.into_response();
        self.tag(response.headers_mut());
        response
    }

    fn tag(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.request_id.to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }
}

/// The request/response pair of one inbound call.
pub struct HttpContext {
    request_id: Uuid,
    parts: request::Parts,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: RequestBody,
    raw_body: Mutex<Option<Body>>,
    responder: Responder,
}

impl HttpContext {
    pub fn new(parts: request::Parts, path_params: Vec<(String, String)>, body: Body) -> Result<Self> {
        let query = match parts.uri.query() {
            Some(raw) => serde_urlencoded::from_str::<Vec<(String, String)>>(raw)
                .map_err(|e| TrestleError::invalid_parameter("query", e))?,
            None => Vec::new(),
        };
        let request_id = Uuid::new_v4();
        Ok(Self {
            request_id,
            parts,
            path_params: path_params.into_iter().collect(),
            query,
            body: RequestBody::Unparsed,
            raw_body: Mutex::new(Some(body)),
            responder: Responder {
                request_id,
                overrides: Arc::default(),
            },
        })
    }

    pub fn from_request(request: Request<Body>, path_params: Vec<(String, String)>) -> Result<Self> {
        let (parts, body) = request.into_parts();
        Self::new(parts, path_params, body)
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.header(CONTENT_TYPE.as_str())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header(CONTENT_LENGTH.as_str()).and_then(|v| v.parse().ok())
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.path_params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// First query string value for `key`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn query_all(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn query_as(&self, key: &str, ty: Option<ParamType>) -> Result<Value> {
        ParamType::coerce(ty, key, self.query(key))
    }

    pub fn param_as(&self, key: &str, ty: Option<ParamType>) -> Result<Value> {
        ParamType::coerce(ty, key, self.param(key))
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn set_body(&mut self, body: RequestBody) {
        self.body = body;
    }

    pub fn is_body_parsed(&self) -> bool {
        !matches!(self.body, RequestBody::Unparsed)
    }

    /// JSON view of the parsed body. Raw bytes and an unparsed body read as
    /// `null`; multipart bodies expose their text fields.
    pub fn body_value(&self) -> Value {
        match &self.body {
            RequestBody::Json(value) | RequestBody::Form(value) => value.clone(),
            RequestBody::Text(text) => Value::String(text.clone()),
            RequestBody::Multipart { fields, .. } => Value::Object(fields.clone()),
            RequestBody::Raw(_) | RequestBody::Unparsed => Value::Null,
        }
    }

    pub fn files(&self) -> &[UploadedFile] {
        match &self.body {
            RequestBody::Multipart { files, .. } => files,
            _ => &[],
        }
    }

    /// Take the unread body stream. Returns `None` once a parser consumed it.
    pub fn take_raw_body(&self) -> Option<Body> {
        self.raw_body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Rebuild a request from the head and the unread body.
    pub(crate) fn to_request(&self) -> Result<Request<Body>> {
        let body = self
            .take_raw_body()
            .ok_or_else(|| TrestleError::BodyParse {
                message: "request body was already consumed".to_string(),
            })?;
        let mut builder = Request::builder()
            .method(self.parts.method.clone())
            .uri(self.parts.uri.clone());
        for (name, value) in self.parts.headers.iter() {
            builder = builder.header(name, value);
        }
        builder.body(body).map_err(|e| TrestleError::BodyParse {
            message: e.to_string(),
        })
    }

    /// Override the status of the response this request will produce.
    pub fn set_status(&self, status: StatusCode) {
        self.responder
            .overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status = Some(status);
    }

    pub fn insert_header(&self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TrestleError::invalid_parameter(name, e))?;
        let value = HeaderValue::from_str(value).map_err(|e| TrestleError::invalid_parameter(name.as_str(), e))?;
        self.responder
            .overrides
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .headers
            .insert(name, value);
        Ok(())
    }

    pub fn responder(&self) -> Responder {
        self.responder.clone()
    }

    /// Write `payload` verbatim as a `text/plain` response.
    pub fn send(&self, payload: impl Into<String>) -> Response {
        self.responder
            .send(StatusCode::OK, "text/plain; charset=utf-8", payload.into())
    }

    pub fn fail(&self, error: TrestleError) -> Response {
        self.responder.fail(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(uri: &str) -> HttpContext {
        let request = Request::builder()
            .uri(uri)
            .header("content-type", "Application/JSON; charset=utf-8")
            .body(Body::empty())
            .unwrap();
        HttpContext::from_request(request, vec![("id".into(), "7".into())]).unwrap()
    }

    #[test]
    fn reads_query_and_path_values() {
        let ctx = context("/users/7?tag=a&tag=b&verbose=true");
        assert_eq!(ctx.param("id"), Some("7"));
        assert_eq!(ctx.query("tag"), Some("a"));
        assert_eq!(ctx.query_all("tag"), vec!["a", "b"]);
        assert_eq!(ctx.query_as("verbose", Some(ParamType::Boolean)).unwrap(), json!(true));
        assert_eq!(ctx.param_as("id", Some(ParamType::Integer)).unwrap(), json!(7));
        assert_eq!(ctx.query_as("missing", None).unwrap(), Value::Null);
        assert_eq!(ctx.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn raw_body_is_taken_once() {
        let ctx = context("/");
        assert!(ctx.take_raw_body().is_some());
        assert!(ctx.take_raw_body().is_none());
        assert!(ctx.to_request().is_err());
    }

    #[test]
    fn overrides_apply_to_sent_responses() {
        let ctx = context("/");
        ctx.set_status(StatusCode::CREATED);
        ctx.insert_header("x-trace", "abc").unwrap();
        let response = ctx.send("ok");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-trace"], "abc");
        assert_eq!(
            response.headers()[REQUEST_ID_HEADER].to_str().unwrap(),
            ctx.request_id().to_string()
        );
    }

    #[test]
    fn body_views() {
        let mut ctx = context("/");
        assert_eq!(ctx.body_value(), Value::Null);
        ctx.set_body(RequestBody::Json(json!({ "name": "ada" })));
        assert!(ctx.is_body_parsed());
        assert_eq!(ctx.body_value()["name"], "ada");
        assert!(ctx.files().is_empty());
    }
}
