//! Body parser middleware, one per [`FormParser`] variant.
//!
//! A parser only runs when the request's media type matches its configured
//! `content_type` and no earlier parser filled the body. Otherwise the
//! request passes through untouched.

use crate::config::{
    BODY_JSON_PARSER, BODY_RAW_PARSER, BODY_TEXT_PARSER, BODY_URLENCODED_PARSER, ConfigContainer,
    JsonParserOptions, RawParserOptions, TextParserOptions, UrlEncodedParserOptions,
};
use crate::context::{HttpContext, RequestBody, UploadedFile};
use crate::error::{Result, TrestleError};
use crate::metadata::FormParser;
use crate::middleware::{Middleware, Next};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart};
use axum::response::Response;
use serde_json::{Map, Value};
use std::sync::Arc;

/// The parser middleware for `parser`, configured from `configs`.
pub fn for_parser(parser: FormParser, configs: &ConfigContainer) -> Arc<dyn Middleware> {
    match parser {
        FormParser::Multipart => multipart(),
        FormParser::Json => json(configs.get_or_default(&BODY_JSON_PARSER)),
        FormParser::UrlEncoded => url_encoded(configs.get_or_default(&BODY_URLENCODED_PARSER)),
        FormParser::Raw => raw(configs.get_or_default(&BODY_RAW_PARSER)),
        FormParser::Text => text(configs.get_or_default(&BODY_TEXT_PARSER)),
    }
}

pub fn json(options: JsonParserOptions) -> Arc<dyn Middleware> {
    Arc::new(JsonParser { options })
}

pub fn url_encoded(options: UrlEncodedParserOptions) -> Arc<dyn Middleware> {
    Arc::new(UrlEncodedParser { options })
}

pub fn text(options: TextParserOptions) -> Arc<dyn Middleware> {
    Arc::new(TextParser { options })
}

pub fn raw(options: RawParserOptions) -> Arc<dyn Middleware> {
    Arc::new(RawParser { options })
}

/// Accepts any mix of text fields and files.
pub fn multipart() -> Arc<dyn Middleware> {
    Arc::new(MultipartParser)
}

/// Parse step shared by every variant.
#[async_trait]
trait ParseBody: Send + Sync + 'static {
    fn content_type(&self) -> &str;

    async fn parse(&self, ctx: &HttpContext) -> Result<RequestBody>;
}

async fn run_parser<P: ParseBody>(parser: &P, mut ctx: HttpContext, next: Next) -> Response {
    let matches = ctx
        .content_type()
        .is_some_and(|media| media.eq_ignore_ascii_case(parser.content_type()));
    if ctx.is_body_parsed() || !matches {
        return next.run(ctx).await;
    }

    match parser.parse(&ctx).await {
        Ok(body) => {
            ctx.set_body(body);
            next.run(ctx).await
        }
        Err(e) => {
            tracing::warn!(request_id = %ctx.request_id(), "Rejected request body: {}", e);
            ctx.fail(e)
        }
    }
}

async fn read_limited(ctx: &HttpContext, limit: usize) -> Result<Bytes> {
    if ctx.content_length().is_some_and(|len| len > limit) {
        return Err(TrestleError::PayloadTooLarge { limit });
    }
    let Some(body) = ctx.take_raw_body() else {
        return Ok(Bytes::new());
    };
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::debug!("Body stream rejected: {}", e);
        TrestleError::PayloadTooLarge { limit }
    })
}

fn body_error(message: impl ToString) -> TrestleError {
    TrestleError::BodyParse {
        message: message.to_string(),
    }
}

/// Insert `value`, turning repeated keys into arrays.
fn insert_repeated(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

macro_rules! parser_middleware {
    ($ty:ident) => {
        #[async_trait]
        impl Middleware for $ty {
            async fn handle(&self, ctx: HttpContext, next: Next) -> Response {
                run_parser(self, ctx, next).await
            }
        }
    };
}

struct JsonParser {
    options: JsonParserOptions,
}

#[async_trait]
impl ParseBody for JsonParser {
    fn content_type(&self) -> &str {
        &self.options.content_type
    }

    async fn parse(&self, ctx: &HttpContext) -> Result<RequestBody> {
        let bytes = read_limited(ctx, self.options.limit).await?;
        let first = bytes.iter().find(|b| !b.is_ascii_whitespace()).copied();
        let Some(first) = first else {
            return Ok(RequestBody::Json(Value::Object(Map::new())));
        };
        if self.options.strict && first != b'{' && first != b'[' {
            return Err(body_error("strict mode only accepts objects and arrays"));
        }
        serde_json::from_slice(&bytes)
            .map(RequestBody::Json)
            .map_err(body_error)
    }
}

parser_middleware!(JsonParser);

struct UrlEncodedParser {
    options: UrlEncodedParserOptions,
}

#[async_trait]
impl ParseBody for UrlEncodedParser {
    fn content_type(&self) -> &str {
        &self.options.content_type
    }

    async fn parse(&self, ctx: &HttpContext) -> Result<RequestBody> {
        let bytes = read_limited(ctx, self.options.limit).await?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes).map_err(body_error)?;
        if pairs.len() > self.options.parameter_limit {
            return Err(TrestleError::TooManyParameters {
                limit: self.options.parameter_limit,
            });
        }
        let mut fields = Map::new();
        for (key, value) in pairs {
            insert_repeated(&mut fields, key, Value::String(value));
        }
        Ok(RequestBody::Form(Value::Object(fields)))
    }
}

parser_middleware!(UrlEncodedParser);

struct TextParser {
    options: TextParserOptions,
}

#[async_trait]
impl ParseBody for TextParser {
    fn content_type(&self) -> &str {
        &self.options.content_type
    }

    async fn parse(&self, ctx: &HttpContext) -> Result<RequestBody> {
        let charset = ctx
            .header("content-type")
            .and_then(|v| {
                v.split(';')
                    .skip(1)
                    .filter_map(|param| param.trim().strip_prefix("charset="))
                    .next()
                    .map(|c| c.trim_matches('"').to_string())
            })
            .unwrap_or_else(|| self.options.default_charset.clone());
        if !matches!(charset.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return Err(body_error(format!("unsupported charset '{}'", charset)));
        }

        let bytes = read_limited(ctx, self.options.limit).await?;
        String::from_utf8(bytes.to_vec())
            .map(RequestBody::Text)
            .map_err(body_error)
    }
}

parser_middleware!(TextParser);

struct RawParser {
    options: RawParserOptions,
}

#[async_trait]
impl ParseBody for RawParser {
    fn content_type(&self) -> &str {
        &self.options.content_type
    }

    async fn parse(&self, ctx: &HttpContext) -> Result<RequestBody> {
        read_limited(ctx, self.options.limit).await.map(RequestBody::Raw)
    }
}

parser_middleware!(RawParser);

struct MultipartParser;

#[async_trait]
impl ParseBody for MultipartParser {
    fn content_type(&self) -> &str {
        "multipart/form-data"
    }

    async fn parse(&self, ctx: &HttpContext) -> Result<RequestBody> {
        let request = ctx.to_request()?;
        let mut multipart = Multipart::from_request(request, &()).await.map_err(body_error)?;

        let mut fields = Map::new();
        let mut files = Vec::new();
        while let Some(field) = multipart.next_field().await.map_err(body_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await.map_err(body_error)?;
                    files.push(UploadedFile {
                        field: name,
                        file_name: Some(file_name),
                        content_type,
                        data,
                    });
                }
                None => {
                    let value = field.text().await.map_err(body_error)?;
                    insert_repeated(&mut fields, name, Value::String(value));
                }
            }
        }
        Ok(RequestBody::Multipart { fields, files })
    }
}

parser_middleware!(MultipartParser);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;
    use crate::testing::TestRequest;
    use axum::http::StatusCode;
    use serde_json::json;

    /// Runs `parser` and echoes the parsed body as JSON.
    async fn parse_with(parser: Arc<dyn Middleware>, request: TestRequest) -> (StatusCode, Value) {
        let echo = from_fn("echo", |ctx: HttpContext, _next: Next| async move {
            let body = match ctx.body() {
                RequestBody::Unparsed => json!("unparsed"),
                RequestBody::Raw(bytes) => json!(bytes.len()),
                RequestBody::Multipart { files, .. } => {
                    json!({ "fields": ctx.body_value(), "files": files.len() })
                }
                _ => ctx.body_value(),
            };
            ctx.send(body.to_string())
        });
        let response = request.send_through(vec![parser, echo]).await;
        let status = response.status;
        let value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn json_bodies_are_parsed() {
        let request = TestRequest::post("/").json(&json!({ "name": "ada" }));
        let (status, body) = parse_with(json(JsonParserOptions::default()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "name": "ada" }));
    }

    #[tokio::test]
    async fn strict_json_rejects_scalars() {
        let request = TestRequest::post("/")
            .header("content-type", "application/json")
            .body("42");
        let (status, _) = parse_with(json(JsonParserOptions::default()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let lenient = JsonParserOptions {
            strict: false,
            ..Default::default()
        };
        let request = TestRequest::post("/")
            .header("content-type", "application/json")
            .body("42");
        let (status, body) = parse_with(json(lenient), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(42));
    }

    #[tokio::test]
    async fn empty_json_body_is_an_empty_object() {
        let request = TestRequest::post("/").header("content-type", "application/json");
        let (_, body) = parse_with(json(JsonParserOptions::default()), request).await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let options = JsonParserOptions {
            limit: 8,
            ..Default::default()
        };
        let request = TestRequest::post("/").json(&json!({ "name": "a long enough value" }));
        let (status, _) = parse_with(json(options), request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn mismatched_content_type_passes_through() {
        let request = TestRequest::post("/")
            .header("content-type", "text/plain")
            .body("hello");
        let (status, body) = parse_with(json(JsonParserOptions::default()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("unparsed"));
    }

    #[tokio::test]
    async fn url_encoded_collects_repeated_keys() {
        let request = TestRequest::post("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("tag=a&tag=b&name=ada");
        let (_, body) = parse_with(url_encoded(UrlEncodedParserOptions::default()), request).await;
        assert_eq!(body, json!({ "tag": ["a", "b"], "name": "ada" }));
    }

    #[tokio::test]
    async fn url_encoded_enforces_parameter_limit() {
        let options = UrlEncodedParserOptions {
            parameter_limit: 2,
            ..Default::default()
        };
        let request = TestRequest::post("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("a=1&b=2&c=3");
        let (status, _) = parse_with(url_encoded(options), request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn text_and_raw_bodies() {
        let request = TestRequest::post("/")
            .header("content-type", "text/plain; charset=utf-8")
            .body("hello");
        let (_, body) = parse_with(text(TextParserOptions::default()), request).await;
        assert_eq!(body, json!("hello"));

        let request = TestRequest::post("/")
            .header("content-type", "text/plain; charset=latin1")
            .body("hello");
        let (status, _) = parse_with(text(TextParserOptions::default()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = TestRequest::post("/")
            .header("content-type", "application/octet-stream")
            .body(vec![0u8, 1, 2, 3]);
        let (_, body) = parse_with(raw(RawParserOptions::default()), request).await;
        assert_eq!(body, json!(4));
    }

    #[tokio::test]
    async fn multipart_splits_fields_and_files() {
        let boundary = "X-BOUNDARY";
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nreport\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nhello\r\n--{b}--\r\n",
            b = boundary
        );
        let request = TestRequest::post("/")
            .header("content-type", &format!("multipart/form-data; boundary={}", boundary))
            .body(payload);
        let (status, body) = parse_with(multipart(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "fields": { "title": "report" }, "files": 1 }));
    }
}
