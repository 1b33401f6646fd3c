use crate::config::{ConfigContainer, JSON_RESULT_OPTIONS, JsonResultOptions, KeyCase, STATIC_TYPED_RESOLVER};
use crate::error::{Result, TrestleError};
use crate::result::MethodResult;
use axum::http::StatusCode;
use heck::{ToLowerCamelCase, ToSnakeCase};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

/// A JSON response body.
///
/// ```
/// use trestle::config::{ConfigContainer, KeyCase};
/// use trestle::result::{JsonResult, MethodResult};
/// use serde_json::json;
///
/// let result = JsonResult::new(json!({ "userName": "ada" }))
///     .indentation(false)
///     .key_case(KeyCase::Snake);
/// let body = result.render(&ConfigContainer::with_defaults()).unwrap();
/// assert_eq!(body, r#"{"user_name":"ada"}"#);
/// ```
pub struct JsonResult {
    value: std::result::Result<Value, String>,
    options: JsonResultOptions,
    status: StatusCode,
}

impl JsonResult {
    pub fn new<T: Serialize>(value: T) -> Self {
        Self {
            value: serde_json::to_value(value).map_err(|e| e.to_string()),
            options: JsonResultOptions::default(),
            status: StatusCode::OK,
        }
    }

    pub fn indentation(mut self, enabled: bool) -> Self {
        self.options.indentation = Some(enabled);
        self
    }

    pub fn key_case(mut self, case: KeyCase) -> Self {
        self.options.key_case = Some(case);
        self
    }

    /// Options that override the container-wide ones where set.
    pub fn options(mut self, options: JsonResultOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl MethodResult for JsonResult {
    fn render(&self, configs: &ConfigContainer) -> Result<String> {
        let value = self.value.clone().map_err(|message| TrestleError::InvalidResultType {
            message: format!("value is not serializable as JSON: {}", message),
        })?;
        let base = configs
            .get(&JSON_RESULT_OPTIONS)
            .unwrap_or_else(JsonResultOptions::defaults);
        let options = self.options.over(&base);

        let value = match configs.get_instance(&STATIC_TYPED_RESOLVER) {
            Some(resolver) => resolver.to_object(value),
            None => value,
        };
        let value = match options.key_case {
            Some(case) => rewrite_keys(value, case),
            None => value,
        };

        if options.indentation.unwrap_or(false) {
            let mut out = Vec::new();
            let mut serializer =
                serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
            value
                .serialize(&mut serializer)
                .map_err(|e| TrestleError::InvalidResultType {
                    message: e.to_string(),
                })?;
            String::from_utf8(out).map_err(|e| TrestleError::InvalidResultType {
                message: e.to_string(),
            })
        } else {
            Ok(value.to_string())
        }
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn status(&self) -> StatusCode {
        self.status
    }
}

fn rewrite_keys(value: Value, case: KeyCase) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let key = match case {
                        KeyCase::Snake => key.to_snake_case(),
                        KeyCase::Camel => key.to_lower_camel_case(),
                    };
                    (key, rewrite_keys(value, case))
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| rewrite_keys(v, case)).collect()),
        other => other,
    }
}
