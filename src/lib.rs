//! # Trestle
//!
//! Declarative controllers with per-request dependency injection on top of
//! axum.
//!
//! Controllers describe their routes through a [`metadata::ControllerBuilder`];
//! the [`compiler::RouteCompiler`] turns them into handler chains of
//! `[body parser?] + middleware + final handler`. Every request resolves a fresh
//! controller in its own [`di::ResolutionPass`], so scoped services live
//! exactly as long as the request, and singletons live as long as the
//! application.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trestle::prelude::*;
//!
//! #[derive(Injectable)]
//! pub struct UserService;
//!
//! impl UserService {
//!     fn names(&self) -> Vec<&'static str> {
//!         vec!["ada", "grace"]
//!     }
//! }
//!
//! #[derive(Injectable)]
//! pub struct UserController {
//!     users: Arc<UserService>,
//! }
//!
//! impl Controller for UserController {
//!     fn configure(c: &mut ControllerBuilder<Self>) {
//!         c.prefix("api");
//!         c.route("list").get("users").handler(|ctx, _| async move {
//!             Ok(JsonResult::new(ctx.users.names()))
//!         });
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> trestle::Result<()> {
//!     App::new()
//!         .singleton::<UserService>()
//!         .controller::<UserController>()
//!         .run()
//!         .await
//! }
//! ```

extern crate self as trestle;

pub mod app;
pub mod compiler;
pub mod config;
pub mod context;
pub mod controller;
pub mod di;
pub mod error;
pub mod metadata;
pub mod middleware;
pub mod pipe;
pub mod result;
pub mod testing;
pub mod transport;
pub mod typed;

// Re-export core types
pub use app::App;
pub use config::ConfigContainer;
pub use context::HttpContext;
pub use controller::{ActionContext, Args, Controller};
pub use di::{Container, Injectable, Lifetime, ProvideKey};
pub use error::{Result, TrestleError};
pub use result::{ActionResult, JsonResult};

// Re-export macros
pub use trestle_macro::Injectable;
pub use trestle_macro::Injectable as DeriveInjectable;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use trestle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::DeriveInjectable as Injectable;
    pub use crate::app::App;
    pub use crate::config::{
        BODY_JSON_PARSER, BODY_RAW_PARSER, BODY_TEXT_PARSER, BODY_URLENCODED_PARSER, ConfigContainer,
        JSON_RESULT_OPTIONS, KeyCase, STATIC_TYPED_RESOLVER,
    };
    pub use crate::context::HttpContext;
    pub use crate::controller::{ActionContext, Args, Controller};
    pub use crate::di::{Container, Injectable, Lifetime, ProvideKey};
    pub use crate::error::{Result, TrestleError};
    pub use crate::metadata::{ControllerBuilder, FormParser, ParamType};
    pub use crate::middleware::{Middleware, Next, RequestLogger, from_fn};
    pub use crate::pipe::builtins::*;
    pub use crate::pipe::{Pipe, PipeError, PipeResult};
    pub use crate::result::{ActionResult, JsonResult, MethodResult};
    pub use async_trait::async_trait;
    pub use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    pub use std::sync::Arc;
}
