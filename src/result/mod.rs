//! Values an action may return, and how they become response bodies.

mod json;

pub use json::JsonResult;

use crate::config::ConfigContainer;
use crate::error::{Result, TrestleError};
use axum::http::StatusCode;
use std::future::Future;
use std::pin::Pin;

/// A structured result that renders itself against the active options.
pub trait MethodResult: Send + 'static {
    fn render(&self, configs: &ConfigContainer) -> Result<String>;

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn status(&self) -> StatusCode {
        StatusCode::OK
    }
}

/// Closed set of things an action returns.
pub enum ActionResult {
    /// Written verbatim.
    Text(String),
    Structured(Box<dyn MethodResult>),
    /// A pending result, rendered once it resolves.
    Async(Pin<Box<dyn Future<Output = ActionResult> + Send>>),
}

impl ActionResult {
    pub fn structured(result: impl MethodResult) -> Self {
        ActionResult::Structured(Box::new(result))
    }

    pub fn deferred<F, R>(future: F) -> Self
    where
        F: Future<Output = R> + Send + 'static,
        R: Into<ActionResult>,
    {
        ActionResult::Async(Box::pin(async move { future.await.into() }))
    }
}

impl std::fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionResult::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ActionResult::Structured(_) => f.write_str("Structured(..)"),
            ActionResult::Async(_) => f.write_str("Async(..)"),
        }
    }
}

impl From<String> for ActionResult {
    fn from(text: String) -> Self {
        ActionResult::Text(text)
    }
}

impl From<&'static str> for ActionResult {
    fn from(text: &'static str) -> Self {
        ActionResult::Text(text.to_string())
    }
}

impl From<JsonResult> for ActionResult {
    fn from(result: JsonResult) -> Self {
        ActionResult::structured(result)
    }
}

/// A result rendered to its wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

/// Await and render `result`.
///
/// An asynchronous result must resolve to text or a structured result; a
/// pending value that resolves to another pending value is rejected.
pub async fn dispatch(result: ActionResult, configs: &ConfigContainer) -> Result<Rendered> {
    let resolved = match result {
        ActionResult::Async(pending) => match pending.await {
            ActionResult::Async(_) => {
                return Err(TrestleError::InvalidResultType {
                    message: "an asynchronous result resolved to another asynchronous result"
                        .to_string(),
                });
            }
            ready => ready,
        },
        ready => ready,
    };

    match resolved {
        ActionResult::Text(body) => Ok(Rendered {
            status: StatusCode::OK,
            content_type: "text/plain; charset=utf-8",
            body,
        }),
        ActionResult::Structured(result) => Ok(Rendered {
            status: result.status(),
            content_type: result.content_type(),
            body: result.render(configs)?,
        }),
        ActionResult::Async(_) => Err(TrestleError::InvalidResultType {
            message: "unresolved asynchronous result".to_string(),
        }),
    }
}
