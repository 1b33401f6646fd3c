use std::any::TypeId;
use std::borrow::Cow;
use std::fmt;

/// Lifetime policy of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Lifetime {
    /// Constructed once and cached for the container's whole lifetime.
    Singleton,
    /// Constructed once per resolution pass (one inbound request).
    Scoped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyId {
    Type(TypeId),
    Named,
}

/// Identity under which a binding is provided.
///
/// Type keys are derived from `TypeId`, so two distinct types never collide even
/// when their names print the same. Named keys compare by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProvideKey {
    id: KeyId,
    name: Cow<'static, str>,
}

impl ProvideKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: KeyId::Type(TypeId::of::<T>()),
            name: Cow::Borrowed(std::any::type_name::<T>()),
        }
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: KeyId::Named,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_named(&self) -> bool {
        self.id == KeyId::Named
    }

    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

impl fmt::Display for ProvideKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
