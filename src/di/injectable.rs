use crate::di::ProvideKey;
use crate::error::{Result, TrestleError};
use std::any::Any;
use std::sync::Arc;

/// Type-erased instance handed around by the container.
///
/// The inner value is always an `Arc<T>`, which lets sized services and
/// `dyn Trait` bindings share one storage shape.
pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Erased {
    Arc::new(value)
}

pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(
    key: &ProvideKey,
    value: Erased,
) -> Result<Arc<T>> {
    value
        .downcast::<Arc<T>>()
        .map(|wrapper| Arc::clone(&*wrapper))
        .map_err(|_| TrestleError::DowncastFailed {
            type_name: format!("{} (provided as '{}')", std::any::type_name::<T>(), key),
        })
}

/// Trait for types the container can construct.
///
/// `dependencies` declares, by position, the keys the constructor needs;
/// `construct` receives them resolved in the same order. This is usually
/// implemented with `#[derive(Injectable)]`.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use trestle::di::{Dependencies, Injectable, ProvideKey};
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn dependencies() -> Vec<ProvideKey> { Vec::new() }
///     fn construct(_: Dependencies) -> trestle::Result<Self> { Ok(Clock) }
/// }
///
/// struct Greeter {
///     clock: Arc<Clock>,
/// }
///
/// impl Injectable for Greeter {
///     fn dependencies() -> Vec<ProvideKey> {
///         vec![ProvideKey::of::<Clock>()]
///     }
///
///     fn construct(mut deps: Dependencies) -> trestle::Result<Self> {
///         Ok(Greeter { clock: deps.next()? })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<ProvideKey>;

    /// # Errors
    /// Returns an error if a dependency has an unexpected type.
    fn construct(deps: Dependencies) -> Result<Self>;
}

/// Resolved constructor arguments, consumed front to back.
pub struct Dependencies {
    values: std::vec::IntoIter<(ProvideKey, Erased)>,
}

impl Dependencies {
    pub(crate) fn new(values: Vec<(ProvideKey, Erased)>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }

    /// Take the next dependency in declaration order.
    pub fn next<T: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let (key, value) = self.values.next().ok_or_else(|| {
            TrestleError::configuration(format!(
                "dependency list exhausted while constructing '{}'",
                std::any::type_name::<T>()
            ))
        })?;
        downcast(&key, value)
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}
