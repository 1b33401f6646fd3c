//! Static-type resolution between wire values and domain values.

use crate::error::{Result, TrestleError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;

type Coercer = fn(Value) -> std::result::Result<Box<dyn Any + Send>, serde_json::Error>;

fn coerce_into<T: DeserializeOwned + Send + 'static>(
    raw: Value,
) -> std::result::Result<Box<dyn Any + Send>, serde_json::Error> {
    serde_json::from_value::<T>(raw).map(|value| Box::new(value) as Box<dyn Any + Send>)
}

/// Target type of a body binding, captured at route declaration.
#[derive(Clone, Copy)]
pub struct StaticType {
    name: &'static str,
    coerce: Coercer,
}

impl StaticType {
    pub fn of<T: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            coerce: coerce_into::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticType").field(&self.name).finish()
    }
}

/// Converts between wire-shaped values and domain instances.
///
/// Installed in the config container under `STATIC_TYPED_RESOLVER`.
pub trait StaticTypedResolver: Send + Sync + 'static {
    /// Turn an outgoing value into its wire shape.
    fn to_object(&self, value: Value) -> Value;

    /// Coerce an incoming wire value into an instance of `target`.
    fn from_object(&self, raw: Value, target: &StaticType) -> Result<Box<dyn Any + Send>>;
}

/// Default resolver backed by the target type's serde implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerdeResolver;

impl StaticTypedResolver for SerdeResolver {
    fn to_object(&self, value: Value) -> Value {
        value
    }

    fn from_object(&self, raw: Value, target: &StaticType) -> Result<Box<dyn Any + Send>> {
        (target.coerce)(raw).map_err(|e| TrestleError::invalid_parameter(target.name(), e))
    }
}
