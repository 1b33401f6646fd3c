//! Route metadata, accumulated from deltas and finalized once per controller.

mod builder;
mod registry;

pub use builder::{ControllerBuilder, ControllerDelta, RouteBuilder, RouteDelta, normalize_prefix};
pub use registry::MetadataRegistry;

use crate::controller::Action;
use crate::error::{Result, TrestleError};
use crate::middleware::Middleware;
use crate::pipe::Pipe;
use crate::typed::StaticType;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// The fixed set of verbs a route may be registered under.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl From<Method> for axum::http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => axum::http::Method::GET,
            Method::Post => axum::http::Method::POST,
            Method::Put => axum::http::Method::PUT,
            Method::Delete => axum::http::Method::DELETE,
            Method::Patch => axum::http::Method::PATCH,
            Method::Options => axum::http::Method::OPTIONS,
            Method::Head => axum::http::Method::HEAD,
        }
    }
}

/// Body parser variant a route asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum FormParser {
    Multipart,
    Json,
    UrlEncoded,
    Raw,
    Text,
}

/// Optional coercion applied to a path or query string value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Json,
}

impl ParamType {
    /// Coerce a raw string. Absent values become `null`.
    pub fn coerce(ty: Option<ParamType>, key: &str, raw: Option<&str>) -> Result<Value> {
        let Some(raw) = raw else {
            return Ok(Value::Null);
        };
        let invalid = |message: String| TrestleError::invalid_parameter(key, message);
        match ty {
            None | Some(ParamType::String) => Ok(Value::String(raw.to_string())),
            Some(ParamType::Integer) => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| invalid(format!("expected an integer, got '{}': {}", raw, e))),
            Some(ParamType::Number) => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid(format!("expected a number, got '{}'", raw))),
            Some(ParamType::Boolean) => match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid(format!("expected a boolean, got '{}'", raw))),
            },
            Some(ParamType::Json) => serde_json::from_str(raw).map_err(|e| invalid(e.to_string())),
        }
    }
}

/// How one positional argument of an action is extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParam {
    pub key: String,
    pub declared_type: Option<ParamType>,
    pub is_query: bool,
}

/// Which parser reads the body and which argument receives it.
#[derive(Debug, Clone)]
pub struct FormBinding {
    pub parser: FormParser,
    pub index: Option<usize>,
    pub target: Option<StaticType>,
}

/// An ordered list plus the flag deciding whether class-level entries are
/// prepended to it.
#[derive(Clone)]
pub struct MergeList<T> {
    pub list: Vec<T>,
    pub merge: bool,
}

/// Accumulated metadata of one endpoint method.
#[derive(Clone, Default)]
pub struct RouteDefinition {
    /// `None` until a path is declared.
    pub path: Option<String>,
    /// Verb tokens, validated when the route is compiled.
    pub allow_methods: Vec<String>,
    pub middleware: Option<MergeList<Arc<dyn Middleware>>>,
    pub pipes: Option<MergeList<Arc<dyn Pipe>>>,
    pub function_params: Vec<Option<FunctionParam>>,
    pub form: Option<FormBinding>,
}

impl RouteDefinition {
    /// Number of positional arguments the action receives.
    pub fn arity(&self) -> usize {
        let form_slot = self
            .form
            .as_ref()
            .and_then(|form| form.index)
            .map_or(0, |index| index + 1);
        self.function_params.len().max(form_slot)
    }

    pub fn middleware_names(&self) -> Vec<&str> {
        self.middleware
            .as_ref()
            .map(|m| m.list.iter().map(|mw| mw.name()).collect())
            .unwrap_or_default()
    }

    pub fn pipe_names(&self) -> Vec<&str> {
        self.pipes
            .as_ref()
            .map(|p| p.list.iter().map(|pipe| pipe.name()).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("path", &self.path)
            .field("allow_methods", &self.allow_methods)
            .field("middleware", &self.middleware_names())
            .field("pipes", &self.pipe_names())
            .field("function_params", &self.function_params)
            .field("form", &self.form)
            .finish()
    }
}

/// Compile-time state of a controller's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum RouteState {
    /// Deltas are still being collected.
    Pending,
    /// Prefix applied and middleware/pipe lists merged.
    Merged,
    /// Bound to a transport; no further mutation.
    Compiled,
}

/// Finalized metadata of one controller type: the registration handle the
/// compiler consumes.
pub struct ControllerMetadata<C> {
    name: &'static str,
    router_prefix: String,
    middlewares: Vec<Arc<dyn Middleware>>,
    pipes: Vec<Arc<dyn Pipe>>,
    routes: BTreeMap<String, RouteDefinition>,
    actions: HashMap<String, Action<C>>,
    state: RouteState,
}

impl<C> ControllerMetadata<C> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn router_prefix(&self) -> &str {
        &self.router_prefix
    }

    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    pub fn pipes(&self) -> &[Arc<dyn Pipe>] {
        &self.pipes
    }

    pub fn routes(&self) -> &BTreeMap<String, RouteDefinition> {
        &self.routes
    }

    pub fn route(&self, action: &str) -> Option<&RouteDefinition> {
        self.routes.get(action)
    }

    /// Mutable access to a merged route. Fails once compiled.
    pub fn route_mut(&mut self, action: &str) -> Result<&mut RouteDefinition> {
        self.ensure_mutable()?;
        self.routes.get_mut(action).ok_or_else(|| {
            TrestleError::configuration(format!("{} has no route named '{}'", self.name, action))
        })
    }

    /// Apply one more delta to a merged route. Class-level lists are not
    /// merged again.
    pub fn apply(&mut self, action: &str, delta: RouteDelta) -> Result<()> {
        self.ensure_mutable()?;
        delta.apply(self.routes.entry(action.to_string()).or_default());
        Ok(())
    }

    pub fn action(&self, name: &str) -> Option<&Action<C>> {
        self.actions.get(name)
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    pub fn is_compiled(&self) -> bool {
        self.state == RouteState::Compiled
    }

    pub(crate) fn mark_compiled(&mut self) -> Result<()> {
        self.ensure_mutable()?;
        self.state = RouteState::Compiled;
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if self.is_compiled() {
            return Err(TrestleError::AlreadyCompiled {
                controller: self.name.to_string(),
            });
        }
        Ok(())
    }
}
