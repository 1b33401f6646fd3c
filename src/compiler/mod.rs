//! Turns finalized controller metadata into handler chains bound to a
//! transport.

mod pipeline;

pub use pipeline::FinalHandler;

use crate::config::ConfigContainer;
use crate::context::HttpContext;
use crate::controller::Controller;
use crate::di::Container;
use crate::error::{Result, TrestleError};
use crate::metadata::{ControllerMetadata, Method, RouteDefinition};
use crate::middleware::{Middleware, Next, body_parser};
use crate::transport::Transport;
use axum::response::Response;
use std::str::FromStr;
use std::sync::Arc;

/// The ordered middleware of one route, ending in its final handler.
#[derive(Clone)]
pub struct HandlerChain {
    handlers: Arc<[Arc<dyn Middleware>]>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            handlers: Arc::from(handlers),
        }
    }

    pub async fn call(&self, ctx: HttpContext) -> Response {
        Next::new(Arc::clone(&self.handlers)).run(ctx).await
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Compiles controllers against a completed container.
pub struct RouteCompiler {
    container: Arc<Container>,
    configs: ConfigContainer,
}

impl RouteCompiler {
    pub fn new(container: Arc<Container>, configs: ConfigContainer) -> Self {
        Self { container, configs }
    }

    /// Register every (verb, route) of `meta` with `transport` and freeze the
    /// metadata. Returns the number of registrations.
    ///
    /// # Errors
    /// `InvalidMethod` for a verb outside the fixed set, `InvalidPath` for a
    /// route without a path, `AlreadyCompiled` on a second call.
    pub fn compile<C: Controller>(
        &self,
        meta: &mut ControllerMetadata<C>,
        transport: &mut dyn Transport,
    ) -> Result<usize> {
        if meta.is_compiled() {
            return Err(TrestleError::AlreadyCompiled {
                controller: meta.name().to_string(),
            });
        }

        let mut registered = 0;
        for (action_name, route) in meta.routes() {
            let qualified = format!("{}::{}", meta.name(), action_name);
            if route.allow_methods.is_empty() {
                tracing::warn!("{} declares no methods; route skipped", qualified);
                continue;
            }

            let mut verbs = Vec::with_capacity(route.allow_methods.len());
            for token in &route.allow_methods {
                let method = Method::from_str(token).map_err(|_| TrestleError::InvalidMethod {
                    method: token.clone(),
                    action: qualified.clone(),
                })?;
                verbs.push(method);
            }
            let path = route
                .path
                .as_deref()
                .filter(|path| !path.is_empty())
                .ok_or_else(|| TrestleError::InvalidPath {
                    action: qualified.clone(),
                })?;

            let chain = self.build_chain(meta, action_name, route)?;
            for method in verbs {
                transport.register(method, path, chain.clone())?;
                tracing::info!("Mapped {{{}, {}}} -> {} ({} handlers)", path, method, qualified, chain.len());
                registered += 1;
            }
        }

        meta.mark_compiled()?;
        tracing::debug!("Compiled {} ({} registrations)", meta.name(), registered);
        Ok(registered)
    }

    /// `[form parser?] + route middleware + [final handler]`.
    fn build_chain<C: Controller>(
        &self,
        meta: &ControllerMetadata<C>,
        action_name: &str,
        route: &RouteDefinition,
    ) -> Result<HandlerChain> {
        let action = meta.action(action_name).cloned().ok_or_else(|| {
            TrestleError::configuration(format!(
                "{}::{} has route metadata but no handler",
                meta.name(),
                action_name
            ))
        })?;

        let mut handlers: Vec<Arc<dyn Middleware>> = Vec::new();
        if let Some(form) = &route.form {
            handlers.push(body_parser::for_parser(form.parser, &self.configs));
        }
        if let Some(middleware) = &route.middleware {
            handlers.extend(middleware.list.iter().cloned());
        }
        handlers.push(Arc::new(FinalHandler::new(
            meta.name(),
            action_name,
            action,
            route,
            Arc::clone(&self.container),
            self.configs.clone(),
        )));
        Ok(HandlerChain::new(handlers))
    }
}
