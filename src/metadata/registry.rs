use crate::metadata::ControllerBuilder;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Explicit per-application store of pending controller metadata, keyed by
/// controller type.
#[derive(Default)]
pub struct MetadataRegistry {
    entries: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The builder for `C`, created empty on first access.
    pub fn get_controller_metadata<C: Send + Sync + 'static>(&mut self) -> &mut ControllerBuilder<C> {
        let entry = self
            .entries
            .entry(TypeId::of::<C>())
            .or_insert_with(|| Box::new(ControllerBuilder::<C>::new()));
        match entry.downcast_mut::<ControllerBuilder<C>>() {
            Some(builder) => builder,
            None => unreachable!("registry entries are keyed by their controller type"),
        }
    }

    /// Replace the builder for `C`.
    pub fn set_controller_metadata<C: Send + Sync + 'static>(&mut self, builder: ControllerBuilder<C>) {
        self.entries.insert(TypeId::of::<C>(), Box::new(builder));
    }

    /// Remove and return the builder for `C`, ready to finalize.
    pub fn take<C: Send + Sync + 'static>(&mut self) -> Option<ControllerBuilder<C>> {
        let boxed = self.entries.remove(&TypeId::of::<C>())?;
        boxed.downcast::<ControllerBuilder<C>>().ok().map(|builder| *builder)
    }

    pub fn contains<C: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Users;
    struct Orders;

    #[test]
    fn builders_are_isolated_per_controller_type() {
        let mut registry = MetadataRegistry::new();
        registry.get_controller_metadata::<Users>().prefix("users");
        registry.get_controller_metadata::<Users>().route("list").get("");
        registry.get_controller_metadata::<Orders>().prefix("orders");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get_controller_metadata::<Users>().delta_count(), 3);

        let users = registry.take::<Users>().unwrap().finalize();
        assert_eq!(users.router_prefix(), "/users/");
        assert_eq!(users.route("list").unwrap().path.as_deref(), Some("/users/"));
        assert!(!registry.contains::<Users>());
        assert!(registry.contains::<Orders>());
    }
}
