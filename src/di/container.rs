use crate::di::{Dependencies, Erased, Injectable, Lifetime, ProvideKey, ResolutionPass, erase};
use crate::error::{Result, TrestleError};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) type Factory = Arc<dyn Fn(&mut ResolutionPass<'_>) -> Result<Erased> + Send + Sync>;

fn factory<F>(f: F) -> Factory
where
    F: Fn(&mut ResolutionPass<'_>) -> Result<Erased> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A "provide → implementation" registration record.
#[derive(Clone)]
pub struct Binding {
    key: ProvideKey,
    implementation: &'static str,
    lifetime: Lifetime,
    dependencies: Vec<ProvideKey>,
    pub(crate) factory: Factory,
}

impl Binding {
    pub fn key(&self) -> &ProvideKey {
        &self.key
    }

    pub fn implementation(&self) -> &'static str {
        self.implementation
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn dependencies(&self) -> &[ProvideKey] {
        &self.dependencies
    }
}

pub(crate) type SingletonSlot = Arc<Mutex<Option<Erased>>>;

/// Thread-safe dependency injection container with singleton and scoped lifetimes.
///
/// Registration takes `&mut self` and happens during bootstrap. After
/// [`Container::complete`] the container is shared behind an `Arc` and only
/// resolves. Every resolution runs inside a [`ResolutionPass`]; scoped instances
/// live exactly as long as that pass.
pub struct Container {
    bindings: DashMap<ProvideKey, Binding>,
    singletons: DashMap<ProvideKey, SingletonSlot>,
    completed: AtomicBool,
}

impl Container {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
            singletons: DashMap::new(),
            completed: AtomicBool::new(false),
        }
    }

    /// Register `I` under its own type key.
    pub fn register<I: Injectable>(&mut self, lifetime: Lifetime) -> Result<&mut Self> {
        self.bind::<I, I, _>(ProvideKey::of::<I>(), lifetime, |instance| instance)
    }

    /// Register `I` as the implementation of the abstract key `P`, usually a
    /// `dyn Trait`.
    ///
    /// # Example
    /// ```ignore
    /// container.register_as::<dyn UserRepository, InMemoryUsers, _>(
    ///     Lifetime::Singleton,
    ///     |repo| repo as Arc<dyn UserRepository>,
    /// )?;
    /// ```
    pub fn register_as<P, I, F>(&mut self, lifetime: Lifetime, caster: F) -> Result<&mut Self>
    where
        P: ?Sized + Send + Sync + 'static,
        I: Injectable,
        F: Fn(Arc<I>) -> Arc<P> + Send + Sync + 'static,
    {
        self.bind::<P, I, F>(ProvideKey::of::<P>(), lifetime, caster)
    }

    /// Register `I` under an explicit key. Re-registering a key overwrites the
    /// previous binding.
    pub fn bind<P, I, F>(&mut self, key: ProvideKey, lifetime: Lifetime, caster: F) -> Result<&mut Self>
    where
        P: ?Sized + Send + Sync + 'static,
        I: Injectable,
        F: Fn(Arc<I>) -> Arc<P> + Send + Sync + 'static,
    {
        let build = factory(move |pass| {
            let instance = pass.create::<I>()?;
            Ok(erase(caster(Arc::new(instance))))
        });
        self.insert(Binding {
            key,
            implementation: std::any::type_name::<I>(),
            lifetime,
            dependencies: I::dependencies(),
            factory: build,
        })
    }

    /// Register a pre-built singleton value.
    pub fn register_instance<T>(&mut self, key: ProvideKey, instance: Arc<T>) -> Result<&mut Self>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let erased = erase(instance);
        self.insert(Binding {
            key,
            implementation: std::any::type_name::<T>(),
            lifetime: Lifetime::Singleton,
            dependencies: Vec::new(),
            factory: factory(move |_| Ok(Arc::clone(&erased))),
        })
    }

    fn insert(&mut self, binding: Binding) -> Result<&mut Self> {
        if binding.key.is_empty() {
            return Err(TrestleError::configuration(
                "cannot register a binding with an empty provide key",
            ));
        }
        if self.is_completed() {
            return Err(TrestleError::configuration(format!(
                "cannot register '{}' after the container was completed",
                binding.key
            )));
        }

        let key = binding.key.clone();
        tracing::debug!(
            "Registered {} -> {} ({})",
            key,
            binding.implementation,
            binding.lifetime
        );
        if self.bindings.insert(key.clone(), binding).is_some() {
            tracing::debug!("Binding for {} overwritten", key);
        }
        self.singletons.remove(&key);
        Ok(self)
    }

    /// Validate the binding graph and freeze registration.
    ///
    /// Every key reachable from a binding or from `roots` must have a binding,
    /// and the graph must be acyclic. Call this once, before serving traffic.
    pub fn complete_with<R>(&self, roots: R) -> Result<()>
    where
        R: IntoIterator<Item = ProvideKey>,
    {
        let mut starts: Vec<ProvideKey> = roots.into_iter().collect();
        let mut registered: Vec<ProvideKey> = self.bindings.iter().map(|b| b.key().clone()).collect();
        registered.sort_by(|a, b| a.name().cmp(b.name()));
        starts.extend(registered);

        let graph: HashMap<ProvideKey, Vec<ProvideKey>> = self
            .bindings
            .iter()
            .map(|b| (b.key().clone(), b.dependencies.clone()))
            .collect();

        let mut done = HashSet::new();
        let mut path = Vec::new();
        for key in &starts {
            visit(key, &graph, &mut done, &mut path)?;
        }

        self.completed.store(true, Ordering::Release);
        tracing::info!("Container completed ({} bindings)", self.bindings.len());
        Ok(())
    }

    pub fn complete(&self) -> Result<()> {
        self.complete_with(std::iter::empty())
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Open a new resolution pass (one per inbound request).
    pub fn begin_pass(&self) -> ResolutionPass<'_> {
        ResolutionPass::new(self)
    }

    /// Resolve a single key in a fresh pass.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.begin_pass().resolve::<T>()
    }

    /// Resolve `I`'s declared dependencies, in order, in a fresh pass.
    pub fn resolve_deps<I: Injectable>(&self) -> Result<Dependencies> {
        self.begin_pass().resolve_deps(&I::dependencies())
    }

    /// Construct `I` in a fresh pass.
    pub fn create<I: Injectable>(&self) -> Result<I> {
        self.begin_pass().create::<I>()
    }

    pub fn contains(&self, key: &ProvideKey) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn binding(&self, key: &ProvideKey) -> Option<Binding> {
        self.bindings.get(key).map(|entry| entry.value().clone())
    }

    pub(crate) fn singleton_slot(&self, key: &ProvideKey) -> SingletonSlot {
        Arc::clone(self.singletons.entry(key.clone()).or_default().value())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

fn visit(
    key: &ProvideKey,
    graph: &HashMap<ProvideKey, Vec<ProvideKey>>,
    done: &mut HashSet<ProvideKey>,
    path: &mut Vec<ProvideKey>,
) -> Result<()> {
    if done.contains(key) {
        return Ok(());
    }
    if let Some(start) = path.iter().position(|k| k == key) {
        return Err(TrestleError::CyclicDependency {
            cycle: describe_cycle(&path[start..], key),
        });
    }
    let deps = graph.get(key).ok_or_else(|| {
        if let Some(parent) = path.last() {
            tracing::error!("{} requires unregistered {}", parent, key);
        }
        TrestleError::MissingBinding {
            key: key.to_string(),
        }
    })?;

    path.push(key.clone());
    for dep in deps {
        visit(dep, graph, done, path)?;
    }
    path.pop();
    done.insert(key.clone());
    Ok(())
}

pub(crate) fn describe_cycle(path: &[ProvideKey], repeated: &ProvideKey) -> String {
    path.iter()
        .chain(std::iter::once(repeated))
        .map(ProvideKey::name)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Counter {
        id: usize,
    }

    impl Injectable for Counter {
        fn dependencies() -> Vec<ProvideKey> {
            Vec::new()
        }

        fn construct(_: Dependencies) -> Result<Self> {
            Ok(Self {
                id: BUILT.fetch_add(1, Ordering::SeqCst),
            })
        }
    }

    trait Greeting: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeting for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    impl Injectable for English {
        fn dependencies() -> Vec<ProvideKey> {
            Vec::new()
        }

        fn construct(_: Dependencies) -> Result<Self> {
            Ok(English)
        }
    }

    struct NeedsMissing;

    impl Injectable for NeedsMissing {
        fn dependencies() -> Vec<ProvideKey> {
            vec![ProvideKey::named("missing.service")]
        }

        fn construct(_: Dependencies) -> Result<Self> {
            Ok(NeedsMissing)
        }
    }

    #[test]
    fn test_register_and_resolve_singleton() {
        let mut container = Container::new();
        container.register::<Counter>(Lifetime::Singleton).unwrap();
        let a = container.resolve::<Counter>().unwrap();
        let b = container.resolve::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_register_and_resolve_trait() {
        let mut container = Container::new();
        container
            .register_as::<dyn Greeting, English, _>(Lifetime::Singleton, |g| g as Arc<dyn Greeting>)
            .unwrap();
        let greeting = container.resolve::<dyn Greeting>().unwrap();
        assert_eq!(greeting.greet(), "hello");
    }

    #[test]
    fn empty_named_key_is_rejected() {
        let mut container = Container::new();
        let err = container
            .bind::<English, English, _>(ProvideKey::named(""), Lifetime::Scoped, |e| e)
            .err()
            .unwrap();
        assert!(matches!(err, TrestleError::Configuration { .. }));
    }

    #[test]
    fn reregistration_overwrites() {
        let mut container = Container::new();
        container.register::<English>(Lifetime::Singleton).unwrap();
        container.register::<English>(Lifetime::Scoped).unwrap();
        assert_eq!(container.len(), 1);
        let binding = container.binding(&ProvideKey::of::<English>()).unwrap();
        assert_eq!(binding.lifetime(), Lifetime::Scoped);
    }

    #[test]
    fn complete_names_missing_key() {
        let mut container = Container::new();
        container.register::<NeedsMissing>(Lifetime::Singleton).unwrap();
        match container.complete() {
            Err(TrestleError::MissingBinding { key }) => assert_eq!(key, "missing.service"),
            other => panic!("expected MissingBinding, got {:?}", other.err()),
        }
        assert!(!container.is_completed());
    }

    #[test]
    fn complete_checks_roots() {
        let container = Container::new();
        let err = container
            .complete_with([ProvideKey::of::<Counter>()])
            .unwrap_err();
        assert!(matches!(err, TrestleError::MissingBinding { .. }));
    }

    #[test]
    fn registration_after_complete_is_rejected() {
        let mut container = Container::new();
        container.complete().unwrap();
        let err = container.register::<English>(Lifetime::Singleton).err().unwrap();
        assert!(matches!(err, TrestleError::Configuration { .. }));
    }
}
