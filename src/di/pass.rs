use crate::di::container::{Binding, describe_cycle};
use crate::di::{Container, Dependencies, Erased, Injectable, Lifetime, ProvideKey, downcast};
use crate::error::{Result, TrestleError};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

/// One bounded unit of dependency resolution, normally one inbound request.
///
/// The pass owns the scoped cache (one instance per scoped key per pass) and
/// the set of keys currently being constructed, which is how cycles are caught
/// before they recurse. Dropping the pass drops every scoped instance it made
/// that nothing else holds on to.
pub struct ResolutionPass<'c> {
    container: &'c Container,
    scoped: HashMap<ProvideKey, Erased>,
    resolving: Vec<ProvideKey>,
}

impl<'c> ResolutionPass<'c> {
    pub(crate) fn new(container: &'c Container) -> Self {
        Self {
            container,
            scoped: HashMap::new(),
            resolving: Vec::new(),
        }
    }

    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        self.resolve_key(&ProvideKey::of::<T>())
    }

    pub fn resolve_key<T: ?Sized + Send + Sync + 'static>(&mut self, key: &ProvideKey) -> Result<Arc<T>> {
        let erased = self.resolve_erased(key)?;
        downcast(key, erased)
    }

    /// Resolve a constructor's dependency list, preserving declaration order.
    pub fn resolve_deps(&mut self, keys: &[ProvideKey]) -> Result<Dependencies> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push((key.clone(), self.resolve_erased(key)?));
        }
        Ok(Dependencies::new(values))
    }

    pub fn create<I: Injectable>(&mut self) -> Result<I> {
        let deps = self.resolve_deps(&I::dependencies())?;
        I::construct(deps)
    }

    /// Number of scoped instances created so far in this pass.
    pub fn scoped_len(&self) -> usize {
        self.scoped.len()
    }

    fn resolve_erased(&mut self, key: &ProvideKey) -> Result<Erased> {
        if let Some(start) = self.resolving.iter().position(|k| k == key) {
            return Err(TrestleError::CyclicDependency {
                cycle: describe_cycle(&self.resolving[start..], key),
            });
        }

        let binding = self
            .container
            .binding(key)
            .ok_or_else(|| TrestleError::MissingBinding {
                key: key.to_string(),
            })?;

        match binding.lifetime() {
            Lifetime::Singleton => {
                let slot = self.container.singleton_slot(key);
                // Held across construction so racing passes build the value once.
                let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(instance) = cached.as_ref() {
                    return Ok(Arc::clone(instance));
                }
                let instance = self.construct(&binding)?;
                *cached = Some(Arc::clone(&instance));
                Ok(instance)
            }
            Lifetime::Scoped => {
                if let Some(instance) = self.scoped.get(key) {
                    return Ok(Arc::clone(instance));
                }
                let instance = self.construct(&binding)?;
                self.scoped.insert(key.clone(), Arc::clone(&instance));
                Ok(instance)
            }
        }
    }

    fn construct(&mut self, binding: &Binding) -> Result<Erased> {
        tracing::trace!("Constructing {} for {}", binding.implementation(), binding.key());
        self.resolving.push(binding.key().clone());
        let result = (binding.factory)(self);
        self.resolving.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    fn next_id() -> usize {
        NEXT_ID.fetch_add(1, Ordering::SeqCst)
    }

    struct RequestState {
        id: usize,
    }

    impl Injectable for RequestState {
        fn dependencies() -> Vec<ProvideKey> {
            Vec::new()
        }

        fn construct(_: Dependencies) -> Result<Self> {
            Ok(Self { id: next_id() })
        }
    }

    struct Audit {
        state: Arc<RequestState>,
    }

    impl Injectable for Audit {
        fn dependencies() -> Vec<ProvideKey> {
            vec![ProvideKey::of::<RequestState>()]
        }

        fn construct(mut deps: Dependencies) -> Result<Self> {
            Ok(Self { state: deps.next()? })
        }
    }

    struct Handler {
        state: Arc<RequestState>,
        audit: Arc<Audit>,
    }

    impl Injectable for Handler {
        fn dependencies() -> Vec<ProvideKey> {
            vec![ProvideKey::of::<RequestState>(), ProvideKey::of::<Audit>()]
        }

        fn construct(mut deps: Dependencies) -> Result<Self> {
            Ok(Self {
                state: deps.next()?,
                audit: deps.next()?,
            })
        }
    }

    struct Cache {
        state: Arc<RequestState>,
    }

    impl Injectable for Cache {
        fn dependencies() -> Vec<ProvideKey> {
            vec![ProvideKey::of::<RequestState>()]
        }

        fn construct(mut deps: Dependencies) -> Result<Self> {
            Ok(Self { state: deps.next()? })
        }
    }

    macro_rules! chained {
        ($name:ident -> $dep:ident) => {
            struct $name;

            impl Injectable for $name {
                fn dependencies() -> Vec<ProvideKey> {
                    vec![ProvideKey::of::<$dep>()]
                }

                fn construct(mut deps: Dependencies) -> Result<Self> {
                    deps.next::<$dep>()?;
                    Ok($name)
                }
            }
        };
    }

    chained!(NodeA -> NodeB);
    chained!(NodeB -> NodeC);
    chained!(NodeC -> NodeA);

    fn scoped_container() -> Container {
        let mut container = Container::new();
        container.register::<RequestState>(Lifetime::Scoped).unwrap();
        container.register::<Audit>(Lifetime::Scoped).unwrap();
        container
    }

    #[test]
    fn scoped_instances_are_shared_within_a_pass() {
        let container = scoped_container();
        let mut pass = container.begin_pass();
        let handler = pass.create::<Handler>().unwrap();
        assert!(Arc::ptr_eq(&handler.state, &handler.audit.state));

        let again = pass.resolve::<RequestState>().unwrap();
        assert!(Arc::ptr_eq(&handler.state, &again));
        assert_eq!(pass.scoped_len(), 2);
    }

    #[test]
    fn scoped_instances_are_fresh_per_pass() {
        let container = scoped_container();
        let first = container.create::<Handler>().unwrap();
        let second = container.create::<Handler>().unwrap();
        assert!(!Arc::ptr_eq(&first.state, &second.state));
        assert_ne!(first.state.id, second.state.id);
    }

    #[test]
    fn singletons_are_shared_across_passes() {
        let mut container = Container::new();
        container.register::<RequestState>(Lifetime::Singleton).unwrap();
        let from_first = container.begin_pass().resolve::<RequestState>().unwrap();
        for _ in 0..5 {
            let again = container.begin_pass().resolve::<RequestState>().unwrap();
            assert!(Arc::ptr_eq(&from_first, &again));
        }
    }

    static SLOW_BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Slow;

    impl Injectable for Slow {
        fn dependencies() -> Vec<ProvideKey> {
            Vec::new()
        }

        fn construct(_: Dependencies) -> Result<Self> {
            SLOW_BUILT.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Slow)
        }
    }

    #[test]
    fn concurrent_first_resolution_builds_a_singleton_once() {
        let mut container = Container::new();
        container.register::<Slow>(Lifetime::Singleton).unwrap();

        let resolved: Vec<Arc<Slow>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| container.resolve::<Slow>().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(SLOW_BUILT.load(Ordering::SeqCst), 1);
        assert!(resolved.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    fn singleton_keeps_the_scoped_instance_it_was_built_with() {
        let mut container = scoped_container();
        container.register::<Cache>(Lifetime::Singleton).unwrap();

        let cache = container.resolve::<Cache>().unwrap();
        let captured = cache.state.id;

        let later = container.resolve::<RequestState>().unwrap();
        assert_ne!(later.id, captured);

        let cache_again = container.resolve::<Cache>().unwrap();
        assert!(Arc::ptr_eq(&cache, &cache_again));
        assert_eq!(cache_again.state.id, captured);
    }

    #[test]
    fn three_node_cycle_is_reported_at_resolution() {
        let mut container = Container::new();
        container.register::<NodeA>(Lifetime::Scoped).unwrap();
        container.register::<NodeB>(Lifetime::Scoped).unwrap();
        container.register::<NodeC>(Lifetime::Singleton).unwrap();

        match container.resolve::<NodeA>() {
            Err(TrestleError::CyclicDependency { cycle }) => {
                assert!(cycle.contains("NodeA"));
                assert!(cycle.contains("NodeB"));
                assert!(cycle.contains("NodeC"));
                assert_eq!(cycle.matches("NodeA").count(), 2);
            }
            other => panic!("expected cycle error, got {:?}", other.err()),
        }
    }

    #[test]
    fn three_node_cycle_is_reported_at_complete() {
        let mut container = Container::new();
        container.register::<NodeA>(Lifetime::Singleton).unwrap();
        container.register::<NodeB>(Lifetime::Singleton).unwrap();
        container.register::<NodeC>(Lifetime::Singleton).unwrap();
        let err = container.complete().unwrap_err();
        assert!(matches!(err, TrestleError::CyclicDependency { .. }));
    }

    #[test]
    fn missing_binding_at_resolution() {
        let container = Container::new();
        let err = container.create::<Handler>().err().unwrap();
        assert!(matches!(err, TrestleError::MissingBinding { .. }));
    }
}
