//! Controllers and their actions.
//!
//! A controller is an [`Injectable`] type whose routes are declared in
//! [`Controller::configure`]. A fresh instance is built for every request, so
//! scoped dependencies are per request.

mod args;

pub use args::{Args, Param};

use crate::context::HttpContext;
use crate::di::Injectable;
use crate::metadata::ControllerBuilder;
use crate::result::ActionResult;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;

pub type ActionFuture = Pin<Box<dyn Future<Output = anyhow::Result<ActionResult>> + Send>>;

/// Type-erased business method of controller `C`.
pub type Action<C> = Arc<dyn Fn(ActionContext<C>, Args) -> ActionFuture + Send + Sync>;

/// Wrap an async handler as an [`Action`].
pub fn action<C, F, Fut, R>(f: F) -> Action<C>
where
    F: Fn(ActionContext<C>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<ActionResult>,
{
    Arc::new(move |ctx: ActionContext<C>, args: Args| -> ActionFuture {
        let fut = f(ctx, args);
        Box::pin(async move { fut.await.map(Into::into) })
    })
}

/// A type whose methods serve routes.
///
/// # Example
/// ```ignore
/// #[derive(Injectable)]
/// struct UserController {
///     users: Arc<UserService>,
/// }
///
/// impl Controller for UserController {
///     fn configure(c: &mut ControllerBuilder<Self>) {
///         c.prefix("api");
///         c.route("list").get("users").handler(|ctx, _| async move {
///             Ok(JsonResult::new(ctx.users.list()))
///         });
///     }
/// }
/// ```
pub trait Controller: Injectable {
    fn configure(builder: &mut ControllerBuilder<Self>);
}

/// The controller instance bound to the request it serves.
pub struct ActionContext<C> {
    controller: C,
    context: HttpContext,
}

impl<C> ActionContext<C> {
    pub fn new(controller: C, context: HttpContext) -> Self {
        Self { controller, context }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn context(&self) -> &HttpContext {
        &self.context
    }

    pub fn into_parts(self) -> (C, HttpContext) {
        (self.controller, self.context)
    }
}

impl<C> Deref for ActionContext<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.controller
    }
}
