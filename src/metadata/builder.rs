use crate::controller::{Action, ActionContext, Args, action};
use crate::metadata::{
    ControllerMetadata, FormBinding, FormParser, FunctionParam, MergeList, ParamType,
    RouteDefinition, RouteState,
};
use crate::middleware::Middleware;
use crate::pipe::Pipe;
use crate::result::ActionResult;
use crate::typed::StaticType;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

/// One contribution to a route's metadata.
#[derive(Clone)]
pub enum RouteDelta {
    /// Last one wins.
    Path(String),
    /// Union of verb tokens, first-seen order.
    Methods(Vec<String>),
    /// Extends the route's own list; the merge flag of the last delta wins.
    Middleware {
        list: Vec<Arc<dyn Middleware>>,
        merge: bool,
    },
    Pipes {
        list: Vec<Arc<dyn Pipe>>,
        merge: bool,
    },
    Param {
        index: usize,
        param: FunctionParam,
    },
    /// Last one wins.
    Form(FormBinding),
}

impl RouteDelta {
    pub(crate) fn apply(self, route: &mut RouteDefinition) {
        match self {
            RouteDelta::Path(path) => route.path = Some(path),
            RouteDelta::Methods(tokens) => {
                for token in tokens {
                    if !route.allow_methods.contains(&token) {
                        route.allow_methods.push(token);
                    }
                }
            }
            RouteDelta::Middleware { list, merge } => extend(&mut route.middleware, list, merge),
            RouteDelta::Pipes { list, merge } => extend(&mut route.pipes, list, merge),
            RouteDelta::Param { index, param } => {
                if route.function_params.len() <= index {
                    route.function_params.resize(index + 1, None);
                }
                route.function_params[index] = Some(param);
            }
            RouteDelta::Form(form) => route.form = Some(form),
        }
    }
}

fn extend<T>(slot: &mut Option<MergeList<T>>, list: Vec<T>, merge: bool) {
    match slot {
        Some(existing) => {
            existing.list.extend(list);
            existing.merge = merge;
        }
        None => *slot = Some(MergeList { list, merge }),
    }
}

/// One contribution to the controller-level metadata.
#[derive(Clone)]
pub enum ControllerDelta {
    Prefix(String),
    Middleware(Vec<Arc<dyn Middleware>>),
    Pipes(Vec<Arc<dyn Pipe>>),
}

/// Normalize a router prefix to `/prefix/`.
///
/// Only the first doubled slash is collapsed: `"a/b"` gives `/a/b/`, no prefix
/// gives `/`, and `"/api/"` gives `/api//`.
pub fn normalize_prefix(prefix: Option<&str>) -> String {
    format!("/{}/", prefix.unwrap_or("")).replacen("//", "/", 1)
}

/// Collects metadata deltas for controller `C` in registration order.
///
/// Nothing is merged until [`ControllerBuilder::finalize`], so the order in
/// which route and controller deltas arrive does not matter.
pub struct ControllerBuilder<C> {
    controller_deltas: Vec<ControllerDelta>,
    route_deltas: Vec<(String, RouteDelta)>,
    actions: HashMap<String, Action<C>>,
}

impl<C> Default for ControllerBuilder<C> {
    fn default() -> Self {
        Self {
            controller_deltas: Vec::new(),
            route_deltas: Vec::new(),
            actions: HashMap::new(),
        }
    }
}

impl<C: Send + Sync + 'static> ControllerBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.controller_delta(ControllerDelta::Prefix(prefix.into()))
    }

    /// Append a class-level middleware.
    pub fn middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.controller_delta(ControllerDelta::Middleware(vec![middleware]))
    }

    /// Append a class-level pipe.
    pub fn pipe(&mut self, pipe: Arc<dyn Pipe>) -> &mut Self {
        self.controller_delta(ControllerDelta::Pipes(vec![pipe]))
    }

    pub fn controller_delta(&mut self, delta: ControllerDelta) -> &mut Self {
        self.controller_deltas.push(delta);
        self
    }

    /// Start describing the route served by `action`.
    pub fn route(&mut self, action: impl Into<String>) -> RouteBuilder<'_, C> {
        RouteBuilder {
            action: action.into(),
            builder: self,
        }
    }

    pub fn route_delta(&mut self, action: impl Into<String>, delta: RouteDelta) -> &mut Self {
        self.route_deltas.push((action.into(), delta));
        self
    }

    pub fn set_action(&mut self, name: impl Into<String>, action: Action<C>) -> &mut Self {
        self.actions.insert(name.into(), action);
        self
    }

    pub fn delta_count(&self) -> usize {
        self.controller_deltas.len() + self.route_deltas.len()
    }

    pub fn state(&self) -> RouteState {
        RouteState::Pending
    }

    /// Apply every delta, normalize the prefix, then prefix relative paths and
    /// merge class-level middleware and pipes into each route.
    pub fn finalize(self) -> ControllerMetadata<C> {
        let name = std::any::type_name::<C>();
        let mut prefix = None;
        let mut middlewares = Vec::new();
        let mut pipes = Vec::new();
        for delta in self.controller_deltas {
            match delta {
                ControllerDelta::Prefix(value) => prefix = Some(value),
                ControllerDelta::Middleware(list) => middlewares.extend(list),
                ControllerDelta::Pipes(list) => pipes.extend(list),
            }
        }

        let mut routes: BTreeMap<String, RouteDefinition> = BTreeMap::new();
        for (action, delta) in self.route_deltas {
            delta.apply(routes.entry(action).or_default());
        }

        let router_prefix = normalize_prefix(prefix.as_deref());
        for route in routes.values_mut() {
            if let Some(path) = route.path.as_mut() {
                if !path.starts_with('/') {
                    *path = format!("{}{}", router_prefix, path);
                }
            }
            route.middleware = merge_with_class(route.middleware.take(), &middlewares);
            route.pipes = merge_with_class(route.pipes.take(), &pipes);
        }

        for action in self.actions.keys() {
            if !routes.contains_key(action) {
                tracing::warn!("{}::{} has a handler but no route metadata", name, action);
            }
        }

        tracing::debug!(
            "Finalized {} ({} routes, prefix {})",
            name,
            routes.len(),
            router_prefix
        );

        ControllerMetadata {
            name,
            router_prefix,
            middlewares,
            pipes,
            routes,
            actions: self.actions,
            state: RouteState::Merged,
        }
    }
}

fn merge_with_class<T: Clone>(own: Option<MergeList<T>>, class: &[T]) -> Option<MergeList<T>> {
    match own {
        Some(MergeList { list, merge: true }) => Some(MergeList {
            list: class.iter().cloned().chain(list).collect(),
            merge: true,
        }),
        Some(explicit) => Some(explicit),
        None => Some(MergeList {
            list: class.to_vec(),
            merge: false,
        }),
    }
}

/// Fluent view over the deltas of one route.
pub struct RouteBuilder<'b, C> {
    action: String,
    builder: &'b mut ControllerBuilder<C>,
}

impl<'b, C: Send + Sync + 'static> RouteBuilder<'b, C> {
    pub fn delta(self, delta: RouteDelta) -> Self {
        self.builder.route_deltas.push((self.action.clone(), delta));
        self
    }

    pub fn path(self, path: impl Into<String>) -> Self {
        self.delta(RouteDelta::Path(path.into()))
    }

    /// Add a verb token. Tokens are validated when the route is compiled.
    pub fn method(self, token: impl Into<String>) -> Self {
        self.delta(RouteDelta::Methods(vec![token.into()]))
    }

    pub fn methods<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delta(RouteDelta::Methods(tokens.into_iter().map(Into::into).collect()))
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.method("GET").path(path)
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.method("POST").path(path)
    }

    pub fn put(self, path: impl Into<String>) -> Self {
        self.method("PUT").path(path)
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.method("DELETE").path(path)
    }

    pub fn patch(self, path: impl Into<String>) -> Self {
        self.method("PATCH").path(path)
    }

    pub fn options(self, path: impl Into<String>) -> Self {
        self.method("OPTIONS").path(path)
    }

    pub fn head(self, path: impl Into<String>) -> Self {
        self.method("HEAD").path(path)
    }

    /// Route-level middleware, run after the controller's class-level list.
    pub fn middleware<I>(self, list: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.delta(RouteDelta::Middleware {
            list: list.into_iter().collect(),
            merge: true,
        })
    }

    /// Route-level middleware that replaces the class-level list.
    pub fn middleware_only<I>(self, list: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.delta(RouteDelta::Middleware {
            list: list.into_iter().collect(),
            merge: false,
        })
    }

    pub fn pipes<I>(self, list: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Pipe>>,
    {
        self.delta(RouteDelta::Pipes {
            list: list.into_iter().collect(),
            merge: true,
        })
    }

    pub fn pipes_only<I>(self, list: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Pipe>>,
    {
        self.delta(RouteDelta::Pipes {
            list: list.into_iter().collect(),
            merge: false,
        })
    }

    /// Argument `index` comes from the path parameter `key`.
    pub fn param(self, index: usize, key: impl Into<String>) -> Self {
        self.bind_param(index, key.into(), None, false)
    }

    pub fn typed_param(self, index: usize, key: impl Into<String>, ty: ParamType) -> Self {
        self.bind_param(index, key.into(), Some(ty), false)
    }

    /// Argument `index` comes from the query string value `key`.
    pub fn query(self, index: usize, key: impl Into<String>) -> Self {
        self.bind_param(index, key.into(), None, true)
    }

    pub fn typed_query(self, index: usize, key: impl Into<String>, ty: ParamType) -> Self {
        self.bind_param(index, key.into(), Some(ty), true)
    }

    fn bind_param(self, index: usize, key: String, declared_type: Option<ParamType>, is_query: bool) -> Self {
        self.delta(RouteDelta::Param {
            index,
            param: FunctionParam {
                key,
                declared_type,
                is_query,
            },
        })
    }

    /// Parse the body with `parser` without binding it to an argument.
    pub fn form(self, parser: FormParser) -> Self {
        self.delta(RouteDelta::Form(FormBinding {
            parser,
            index: None,
            target: None,
        }))
    }

    /// Parse the body with `parser` and pass it raw as argument `index`.
    pub fn body(self, parser: FormParser, index: usize) -> Self {
        self.delta(RouteDelta::Form(FormBinding {
            parser,
            index: Some(index),
            target: None,
        }))
    }

    /// Parse the body with `parser` and coerce it into `T` for argument `index`.
    pub fn typed_body<T: DeserializeOwned + Send + 'static>(self, parser: FormParser, index: usize) -> Self {
        self.delta(RouteDelta::Form(FormBinding {
            parser,
            index: Some(index),
            target: Some(StaticType::of::<T>()),
        }))
    }

    /// The business method invoked for this route.
    pub fn handler<F, Fut, R>(self, f: F) -> Self
    where
        F: Fn(ActionContext<C>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<ActionResult>,
    {
        self.builder.set_action(self.action.clone(), action(f));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::from_fn;

    struct Users;

    fn named(name: &'static str) -> Arc<dyn Middleware> {
        from_fn(name, |ctx, next| next.run(ctx))
    }

    #[test]
    fn prefix_normalization_fixes_only_the_first_double_slash() {
        assert_eq!(normalize_prefix(Some("a/b")), "/a/b/");
        assert_eq!(normalize_prefix(None), "/");
        assert_eq!(normalize_prefix(Some("api")), "/api/");
        assert_eq!(normalize_prefix(Some("/api")), "/api/");
        assert_eq!(normalize_prefix(Some("/api/")), "/api//");
    }

    #[test]
    fn relative_paths_get_the_prefix_and_absolute_paths_opt_out() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.route("list").get("users");
        builder.route("health").get("/health");
        builder.prefix("api");
        let meta = builder.finalize();

        assert_eq!(meta.router_prefix(), "/api/");
        assert_eq!(meta.route("list").unwrap().path.as_deref(), Some("/api/users"));
        assert_eq!(meta.route("health").unwrap().path.as_deref(), Some("/health"));
    }

    #[test]
    fn merged_middleware_runs_class_entries_first() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.route("create").post("users").middleware([named("X")]);
        builder.middleware(named("A")).middleware(named("B"));
        let meta = builder.finalize();

        assert_eq!(meta.route("create").unwrap().middleware_names(), vec!["A", "B", "X"]);
    }

    #[test]
    fn routes_without_middleware_adopt_the_class_list() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.middleware(named("Auth"));
        builder.route("list").get("users");
        let meta = builder.finalize();

        let route = meta.route("list").unwrap();
        assert_eq!(route.middleware_names(), vec!["Auth"]);
        assert!(!route.middleware.as_ref().unwrap().merge);
    }

    #[test]
    fn explicit_opt_out_keeps_own_list() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.middleware(named("Auth"));
        builder.route("login").post("login").middleware_only([named("RateLimit")]);
        let meta = builder.finalize();

        assert_eq!(meta.route("login").unwrap().middleware_names(), vec!["RateLimit"]);
    }

    #[test]
    fn pipes_follow_the_same_policy() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.pipe(Arc::new(crate::pipe::builtins::RequireParamsPipe));
        builder.route("a").get("a").pipes_only(Vec::<Arc<dyn Pipe>>::new());
        builder.route("b").get("b");
        let meta = builder.finalize();

        assert!(meta.route("a").unwrap().pipe_names().is_empty());
        assert_eq!(meta.route("b").unwrap().pipe_names().len(), 1);
    }

    #[test]
    fn deltas_accumulate_on_one_route() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.route("find").typed_query(1, "verbose", ParamType::Boolean);
        builder.route("find").method("GET").method("HEAD").method("GET");
        builder.route("find").param(0, "id").path("users/:id");
        let meta = builder.finalize();

        let route = meta.route("find").unwrap();
        assert_eq!(route.allow_methods, vec!["GET", "HEAD"]);
        assert_eq!(route.arity(), 2);
        assert_eq!(route.function_params[0].as_ref().unwrap().key, "id");
        assert!(route.function_params[1].as_ref().unwrap().is_query);
        assert_eq!(route.path.as_deref(), Some("/users/:id"));
    }

    #[test]
    fn empty_method_list_is_valid_until_compile() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.route("draft").path("draft");
        let meta = builder.finalize();
        assert!(meta.route("draft").unwrap().allow_methods.is_empty());
        assert_eq!(meta.state(), RouteState::Merged);
    }

    #[test]
    fn compiled_metadata_rejects_mutation() {
        let mut builder = ControllerBuilder::<Users>::new();
        builder.route("list").get("users");
        let mut meta = builder.finalize();
        meta.apply("list", RouteDelta::Path("/v2/users".into())).unwrap();
        meta.mark_compiled().unwrap();

        let err = meta.apply("list", RouteDelta::Path("x".into())).unwrap_err();
        assert!(matches!(err, crate::TrestleError::AlreadyCompiled { .. }));
        assert!(meta.route_mut("list").is_err());
    }
}
