use crate::error::{Result, TrestleError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;

/// One extracted argument.
pub enum Param {
    /// Path, query or body value in wire shape.
    Value(Value),
    /// Body already coerced into its declared target type.
    Typed(Box<dyn Any + Send>),
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Param::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Param::Typed(_) => f.write_str("Typed(..)"),
        }
    }
}

/// Positional arguments of an action, in declaration order.
#[derive(Debug, Default)]
pub struct Args {
    keys: Vec<String>,
    values: Vec<Param>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, param: Param) {
        self.keys.push(key.into());
        self.values.push(param);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Key the argument was extracted from (`""` for unbound positions).
    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Wire value at `index`. `None` for typed bodies.
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self.values.get(index)? {
            Param::Value(value) => Some(value),
            Param::Typed(_) => None,
        }
    }

    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let slot = self.values.get_mut(index).ok_or_else(|| {
            TrestleError::invalid_parameter(index.to_string(), "argument index out of range")
        })?;
        *slot = Param::Value(value);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.keys.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Move the argument at `index` out as a `T`, leaving `null` behind.
    ///
    /// Typed bodies are downcast; wire values are deserialized.
    pub fn take<T: DeserializeOwned + 'static>(&mut self, index: usize) -> Result<T> {
        let key = self.key(index).unwrap_or_default().to_string();
        let slot = self.values.get_mut(index).ok_or_else(|| {
            TrestleError::invalid_parameter(index.to_string(), "argument index out of range")
        })?;
        match std::mem::replace(slot, Param::Value(Value::Null)) {
            Param::Value(value) => {
                serde_json::from_value(value).map_err(|e| TrestleError::invalid_parameter(key, e))
            }
            Param::Typed(boxed) => boxed.downcast::<T>().map(|typed| *typed).map_err(|_| {
                TrestleError::DowncastFailed {
                    type_name: std::any::type_name::<T>().to_string(),
                }
            }),
        }
    }

    /// Like [`Args::take`] for types that only arrive typed, such as raw
    /// `Bytes` bodies.
    pub fn take_any<T: 'static>(&mut self, index: usize) -> Result<T> {
        let slot = self.values.get_mut(index).ok_or_else(|| {
            TrestleError::invalid_parameter(index.to_string(), "argument index out of range")
        })?;
        match std::mem::replace(slot, Param::Value(Value::Null)) {
            Param::Typed(boxed) => match boxed.downcast::<T>() {
                Ok(typed) => Ok(*typed),
                Err(boxed) => {
                    *slot = Param::Typed(boxed);
                    Err(TrestleError::DowncastFailed {
                        type_name: std::any::type_name::<T>().to_string(),
                    })
                }
            },
            other => {
                *slot = other;
                Err(TrestleError::DowncastFailed {
                    type_name: std::any::type_name::<T>().to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Filter {
        tag: String,
    }

    #[test]
    fn take_deserializes_and_downcasts() {
        let mut args = Args::new();
        args.push("id", Param::Value(json!(7)));
        args.push("body", Param::Typed(Box::new(Filter { tag: "x".into() })));

        assert_eq!(args.take::<u32>(0).unwrap(), 7);
        assert_eq!(args.take::<Filter>(1).unwrap(), Filter { tag: "x".into() });
        assert_eq!(args.get(0), Some(&Value::Null));
    }

    #[test]
    fn wrong_shapes_are_parameter_errors() {
        let mut args = Args::new();
        args.push("id", Param::Value(json!("abc")));
        let err = args.take::<u32>(0).unwrap_err();
        assert!(matches!(err, TrestleError::InvalidParameter { key, .. } if key == "id"));
        assert!(args.take::<u32>(5).is_err());
    }

    #[test]
    fn take_any_keeps_the_value_on_mismatch() {
        let mut args = Args::new();
        args.push("body", Param::Typed(Box::new(vec![1u8, 2])));
        assert!(args.take_any::<String>(0).is_err());
        assert_eq!(args.take_any::<Vec<u8>>(0).unwrap(), vec![1, 2]);
    }
}
