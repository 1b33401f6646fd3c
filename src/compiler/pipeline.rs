use crate::config::{ConfigContainer, STATIC_TYPED_RESOLVER};
use crate::context::{HttpContext, RequestBody};
use crate::controller::{Action, ActionContext, Args, Controller, Param};
use crate::di::Container;
use crate::error::{Result, TrestleError};
use crate::metadata::{FormBinding, FunctionParam, RouteDefinition};
use crate::middleware::{Middleware, Next};
use crate::pipe::{self, Pipe};
use crate::result::{Rendered, dispatch};
use async_trait::async_trait;
use axum::response::Response;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Last handler of every chain: builds the controller, extracts arguments,
/// runs pipes, invokes the action and writes its result.
pub struct FinalHandler<C> {
    controller: &'static str,
    action_name: String,
    action: Action<C>,
    params: Vec<Option<FunctionParam>>,
    form: Option<FormBinding>,
    pipes: Vec<Arc<dyn Pipe>>,
    arity: usize,
    container: Arc<Container>,
    configs: ConfigContainer,
}

impl<C: Controller> FinalHandler<C> {
    pub(crate) fn new(
        controller: &'static str,
        action_name: &str,
        action: Action<C>,
        route: &RouteDefinition,
        container: Arc<Container>,
        configs: ConfigContainer,
    ) -> Self {
        Self {
            controller,
            action_name: action_name.to_string(),
            action,
            params: route.function_params.clone(),
            form: route.form.clone(),
            pipes: route
                .pipes
                .as_ref()
                .map(|p| p.list.clone())
                .unwrap_or_default(),
            arity: route.arity(),
            container,
            configs,
        }
    }

    async fn invoke(&self, ctx: HttpContext) -> Result<Rendered> {
        // One resolution pass per request.
        let controller = self.container.create::<C>()?;
        let args = self.extract(&ctx)?;
        let args = pipe::run_all(&self.pipes, &ctx, args).await?;
        // A panicking action fails its own request only.
        let result = AssertUnwindSafe(async {
            (self.action)(ActionContext::new(controller, ctx), args).await
        })
        .catch_unwind()
        .await
        .map_err(|panic| TrestleError::Panicked {
            message: panic_message(panic.as_ref()),
        })?
        .map_err(TrestleError::from_handler)?;
        dispatch(result, &self.configs).await
    }

    fn extract(&self, ctx: &HttpContext) -> Result<Args> {
        let body_slot = self.form.as_ref().and_then(|form| form.index);
        let mut args = Args::new();
        for index in 0..self.arity {
            if body_slot == Some(index) {
                args.push("body", self.body_param(ctx)?);
                continue;
            }
            match self.params.get(index).and_then(Option::as_ref) {
                Some(param) if param.is_query => {
                    let value = ctx.query_as(&param.key, param.declared_type)?;
                    args.push(param.key.clone(), Param::Value(value));
                }
                Some(param) => {
                    let value = ctx.param_as(&param.key, param.declared_type)?;
                    args.push(param.key.clone(), Param::Value(value));
                }
                None => args.push("", Param::Value(Value::Null)),
            }
        }
        Ok(args)
    }

    fn body_param(&self, ctx: &HttpContext) -> Result<Param> {
        let target = self.form.as_ref().and_then(|form| form.target.as_ref());
        match (target, ctx.body()) {
            (Some(target), _) => {
                let resolver = self.configs.get_instance(&STATIC_TYPED_RESOLVER).ok_or_else(|| {
                    TrestleError::configuration("no static typed resolver is configured")
                })?;
                resolver.from_object(ctx.body_value(), target).map(Param::Typed)
            }
            (None, RequestBody::Raw(bytes)) => Ok(Param::Typed(Box::new(bytes.clone()))),
            (None, _) => Ok(Param::Value(ctx.body_value())),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[async_trait]
impl<C: Controller> Middleware for FinalHandler<C> {
    async fn handle(&self, ctx: HttpContext, _next: Next) -> Response {
        let responder = ctx.responder();
        let request_id = ctx.request_id();
        let start = Instant::now();

        match self.invoke(ctx).await {
            Ok(rendered) => {
                tracing::debug!(
                    %request_id,
                    "{}::{} handled in {:?}",
                    self.controller,
                    self.action_name,
                    start.elapsed()
                );
                responder.send(rendered.status, rendered.content_type, rendered.body)
            }
            Err(e) => {
                if e.status_code().is_server_error() {
                    tracing::error!(%request_id, "{}::{} failed: {}", self.controller, self.action_name, e);
                } else {
                    tracing::warn!(%request_id, "{}::{} rejected: {}", self.controller, self.action_name, e);
                }
                responder.fail(e)
            }
        }
    }
}
