use serde::{Deserialize, Serialize};

const TEN_MB: usize = 10 * 1024 * 1024;

/// Options for the JSON body parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonParserOptions {
    /// Maximum body size in bytes.
    pub limit: usize,
    /// Only accept objects and arrays at the top level.
    pub strict: bool,
    pub content_type: String,
}

impl Default for JsonParserOptions {
    fn default() -> Self {
        Self {
            limit: TEN_MB,
            strict: true,
            content_type: "application/json".to_string(),
        }
    }
}

/// Options for the `application/x-www-form-urlencoded` body parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEncodedParserOptions {
    pub limit: usize,
    /// Maximum number of key/value pairs.
    pub parameter_limit: usize,
    pub content_type: String,
}

impl Default for UrlEncodedParserOptions {
    fn default() -> Self {
        Self {
            limit: 100 * 1024,
            parameter_limit: 1000,
            content_type: "application/x-www-form-urlencoded".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextParserOptions {
    pub limit: usize,
    pub default_charset: String,
    pub content_type: String,
}

impl Default for TextParserOptions {
    fn default() -> Self {
        Self {
            limit: TEN_MB,
            default_charset: "utf-8".to_string(),
            content_type: "text/plain".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParserOptions {
    pub limit: usize,
    pub content_type: String,
}

impl Default for RawParserOptions {
    fn default() -> Self {
        Self {
            limit: TEN_MB,
            content_type: "application/octet-stream".to_string(),
        }
    }
}

/// Key rewriting applied recursively by `JsonResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCase {
    /// `userName` becomes `user_name`.
    Snake,
    /// `user_name` becomes `userName`.
    Camel,
}

/// Serialization options for `JsonResult`.
///
/// Every field is optional: options attached to a result override the
/// container-wide `JSON_RESULT_OPTIONS` only where they are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonResultOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indentation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_case: Option<KeyCase>,
}

impl JsonResultOptions {
    pub fn defaults() -> Self {
        Self {
            indentation: Some(true),
            key_case: None,
        }
    }

    /// Fields set on `self` win; unset fields fall back to `base`.
    pub fn over(&self, base: &JsonResultOptions) -> JsonResultOptions {
        JsonResultOptions {
            indentation: self.indentation.or(base.indentation),
            key_case: self.key_case.or(base.key_case),
        }
    }
}
