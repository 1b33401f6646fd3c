//! Application Bootstrap
//!
//! Collects bindings, options and controllers, then compiles everything once
//! before the first request is served.

mod shutdown;

pub use shutdown::shutdown_signal;

use crate::compiler::RouteCompiler;
use crate::config::{ConfigContainer, ConfigKey, ServerConfig};
use crate::controller::Controller;
use crate::di::{Container, Injectable, Lifetime, ProvideKey};
use crate::error::{Result, TrestleError};
use crate::metadata::{ControllerBuilder, MetadataRegistry};
use crate::transport::{AxumTransport, Transport};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;

type CompileStep =
    Box<dyn FnOnce(&mut MetadataRegistry, &RouteCompiler, &mut dyn Transport) -> Result<usize> + Send>;

/// Application builder
///
/// Registration errors are kept until [`App::into_router`], [`App::compile_into`]
/// or [`App::run`], which fail before any traffic is served.
///
/// # Example
///
/// ```rust,ignore
/// use trestle::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> trestle::Result<()> {
///     App::new()
///         .singleton::<UserService>()
///         .scoped::<RequestLog>()
///         .controller::<UserController>()
///         .listen(8080)
///         .run()
///         .await
/// }
/// ```
pub struct App {
    container: Container,
    configs: ConfigContainer,
    registry: MetadataRegistry,
    steps: Vec<CompileStep>,
    roots: Vec<ProvideKey>,
    controllers: Vec<&'static str>,
    server: ServerConfig,
    errors: Vec<TrestleError>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// A new application with default options and `HOST`/`PORT` from the
    /// environment.
    pub fn new() -> Self {
        let configs = ConfigContainer::with_defaults();
        let mut app = Self {
            container: Container::new(),
            configs: configs.clone(),
            registry: MetadataRegistry::new(),
            steps: Vec::new(),
            roots: Vec::new(),
            controllers: Vec::new(),
            server: ServerConfig::from_env(),
            errors: Vec::new(),
        };
        let result = app
            .container
            .register_instance(ProvideKey::of::<ConfigContainer>(), Arc::new(configs))
            .map(|_| ());
        app.record(result);
        app
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            tracing::error!("Bootstrap error: {}", e);
            self.errors.push(e);
        }
    }

    /// Serve the routes of `C`.
    pub fn controller<C: Controller>(mut self) -> Self {
        let name = std::any::type_name::<C>();
        if self.controllers.contains(&name) {
            self.record(Err(TrestleError::configuration(format!(
                "controller {} is registered twice",
                name
            ))));
            return self;
        }

        C::configure(self.registry.get_controller_metadata::<C>());
        self.roots.extend(C::dependencies());
        self.controllers.push(name);
        self.steps.push(Box::new(
            |registry: &mut MetadataRegistry, compiler: &RouteCompiler, transport: &mut dyn Transport| {
                let builder = registry.take::<C>().unwrap_or_default();
                let mut meta = builder.finalize();
                compiler.compile(&mut meta, transport)
            },
        ));
        self
    }

    /// Add metadata deltas to `C` from outside the controller.
    pub fn configure<C, F>(mut self, f: F) -> Self
    where
        C: Controller,
        F: FnOnce(&mut ControllerBuilder<C>),
    {
        f(self.registry.get_controller_metadata::<C>());
        self
    }

    pub fn singleton<I: Injectable>(self) -> Self {
        self.provide::<I, I, _>(ProvideKey::of::<I>(), Lifetime::Singleton, |i| i)
    }

    pub fn scoped<I: Injectable>(self) -> Self {
        self.provide::<I, I, _>(ProvideKey::of::<I>(), Lifetime::Scoped, |i| i)
    }

    /// Provide the abstract key `P` with the implementation `I`.
    ///
    /// ```rust,ignore
    /// app.singleton_as::<dyn UserRepository, InMemoryUsers, _>(|r| r)
    /// ```
    pub fn singleton_as<P, I, F>(self, caster: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        I: Injectable,
        F: Fn(Arc<I>) -> Arc<P> + Send + Sync + 'static,
    {
        self.provide::<P, I, F>(ProvideKey::of::<P>(), Lifetime::Singleton, caster)
    }

    pub fn scoped_as<P, I, F>(self, caster: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        I: Injectable,
        F: Fn(Arc<I>) -> Arc<P> + Send + Sync + 'static,
    {
        self.provide::<P, I, F>(ProvideKey::of::<P>(), Lifetime::Scoped, caster)
    }

    /// Register `I` under an explicit key, such as a named one.
    pub fn provide<P, I, F>(mut self, key: ProvideKey, lifetime: Lifetime, caster: F) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        I: Injectable,
        F: Fn(Arc<I>) -> Arc<P> + Send + Sync + 'static,
    {
        let result = self.container.bind::<P, I, F>(key, lifetime, caster).map(|_| ());
        self.record(result);
        self
    }

    /// Register a pre-built value as the singleton for `T`.
    pub fn singleton_instance<T>(self, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.provide_instance(ProvideKey::of::<T>(), instance)
    }

    /// Register a pre-built value under an explicit key.
    pub fn provide_instance<T>(mut self, key: ProvideKey, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let result = self.container.register_instance(key, instance).map(|_| ());
        self.record(result);
        self
    }

    /// Merge plain option data into `key`.
    pub fn use_options<V, S>(mut self, key: &ConfigKey<V>, value: &S) -> Self
    where
        V: ?Sized,
        S: Serialize + ?Sized,
    {
        let result = self.configs.set(key, value);
        self.record(result);
        self
    }

    /// Replace the option under `key` with an opaque instance.
    pub fn use_instance<V>(self, key: &ConfigKey<V>, value: Arc<V>) -> Self
    where
        V: ?Sized + Send + Sync + 'static,
    {
        self.configs.set_instance(key, value);
        self
    }

    pub fn listen(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.server
    }

    pub fn configs(&self) -> &ConfigContainer {
        &self.configs
    }

    /// Complete the container and compile every controller into `transport`.
    /// Returns the number of route registrations.
    pub fn compile_into(self, transport: &mut dyn Transport) -> Result<usize> {
        let App {
            container,
            configs,
            mut registry,
            steps,
            roots,
            controllers,
            errors,
            ..
        } = self;
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        container.complete_with(roots)?;
        let compiler = RouteCompiler::new(Arc::new(container), configs);

        let mut registered = 0;
        for step in steps {
            registered += step(&mut registry, &compiler, &mut *transport)?;
        }
        if !registry.is_empty() {
            tracing::warn!(
                "{} controller(s) were configured but never registered",
                registry.len()
            );
        }
        tracing::info!(
            "Application compiled: {} controllers, {} routes",
            controllers.len(),
            registered
        );
        Ok(registered)
    }

    /// Compile into an axum [`Router`].
    pub fn into_router(self) -> Result<Router> {
        let mut transport = AxumTransport::new();
        self.compile_into(&mut transport)?;
        Ok(transport.into_router())
    }

    /// Compile, bind the listen address and serve until a shutdown signal.
    pub async fn run(self) -> Result<()> {
        let address = self.server.address();
        let router = self.into_router()?;
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!("Listening on {}", address);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("Server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::Dependencies;
    use crate::testing::{RecordingTransport, TestRequest};

    struct Clock;

    impl Injectable for Clock {
        fn dependencies() -> Vec<ProvideKey> {
            Vec::new()
        }

        fn construct(_: Dependencies) -> Result<Self> {
            Ok(Clock)
        }
    }

    struct Status {
        _clock: Arc<Clock>,
        configs: Arc<ConfigContainer>,
    }

    impl Injectable for Status {
        fn dependencies() -> Vec<ProvideKey> {
            vec![ProvideKey::of::<Clock>(), ProvideKey::of::<ConfigContainer>()]
        }

        fn construct(mut deps: Dependencies) -> Result<Self> {
            Ok(Self {
                _clock: deps.next()?,
                configs: deps.next()?,
            })
        }
    }

    impl Controller for Status {
        fn configure(c: &mut ControllerBuilder<Self>) {
            c.route("options").get("options").handler(|ctx, _| async move {
                Ok(ctx.configs.len().to_string())
            });
        }
    }

    #[test]
    fn missing_controller_dependency_fails_at_startup() {
        let err = App::new()
            .controller::<Status>()
            .compile_into(&mut RecordingTransport::default())
            .unwrap_err();
        assert!(matches!(err, TrestleError::MissingBinding { key } if key.ends_with("Clock")));
    }

    #[test]
    fn registration_errors_are_deferred_to_compile() {
        let err = App::new()
            .provide::<Clock, Clock, _>(ProvideKey::named(" "), Lifetime::Singleton, |c| c)
            .singleton::<Clock>()
            .controller::<Status>()
            .compile_into(&mut RecordingTransport::default())
            .unwrap_err();
        assert!(matches!(err, TrestleError::Configuration { .. }));
    }

    #[test]
    fn duplicate_controllers_are_rejected() {
        let err = App::new()
            .singleton::<Clock>()
            .controller::<Status>()
            .controller::<Status>()
            .compile_into(&mut RecordingTransport::default())
            .unwrap_err();
        assert!(matches!(err, TrestleError::Configuration { .. }));
    }

    struct Lookup;

    impl Injectable for Lookup {
        fn dependencies() -> Vec<ProvideKey> {
            Vec::new()
        }

        fn construct(_: Dependencies) -> Result<Self> {
            Ok(Lookup)
        }
    }

    impl Controller for Lookup {
        fn configure(c: &mut ControllerBuilder<Self>) {
            c.prefix("lookup");
            c.route("find").get(":id").handler(|_, _| async { Ok("found") });
            c.route("remove").delete(":name").handler(|_, _| async { Ok("removed") });
        }
    }

    #[test]
    fn conflicting_route_parameters_fail_at_startup() {
        let err = App::new().controller::<Lookup>().into_router().unwrap_err();
        assert!(matches!(err, TrestleError::Configuration { message } if message.contains("conflicts")));
    }

    #[tokio::test]
    async fn config_container_is_injectable() {
        let mut transport = RecordingTransport::default();
        let count = App::new()
            .singleton::<Clock>()
            .controller::<Status>()
            .configure::<Status, _>(|c| {
                c.prefix("status");
            })
            .compile_into(&mut transport)
            .unwrap();
        assert_eq!(count, 1);

        let response = TestRequest::get("/status/options").dispatch(&transport).await;
        assert_eq!(response.body, "6");
    }

    #[test]
    fn listen_overrides_port() {
        let app = App::new().listen(8081).host("127.0.0.1");
        assert_eq!(app.server_config().address(), "127.0.0.1:8081");
    }
}
