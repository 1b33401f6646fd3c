mod options;
mod server;

pub use options::{
    JsonParserOptions, JsonResultOptions, KeyCase, RawParserOptions, TextParserOptions,
    UrlEncodedParserOptions,
};
pub use server::ServerConfig;

use crate::di::{Erased, ProvideKey, downcast, erase};
use crate::error::{Result, TrestleError};
use crate::typed::{SerdeResolver, StaticTypedResolver};
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed key into a [`ConfigContainer`].
pub struct ConfigKey<V: ?Sized> {
    name: &'static str,
    _marker: PhantomData<fn(&V)>,
}

impl<V: ?Sized> ConfigKey<V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<V: ?Sized> Clone for ConfigKey<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V: ?Sized> Copy for ConfigKey<V> {}

pub const JSON_RESULT_OPTIONS: ConfigKey<JsonResultOptions> = ConfigKey::new("json_result_options");
pub const BODY_JSON_PARSER: ConfigKey<JsonParserOptions> = ConfigKey::new("body_json_parser");
pub const BODY_URLENCODED_PARSER: ConfigKey<UrlEncodedParserOptions> =
    ConfigKey::new("body_urlencoded_parser");
pub const BODY_TEXT_PARSER: ConfigKey<TextParserOptions> = ConfigKey::new("body_text_parser");
pub const BODY_RAW_PARSER: ConfigKey<RawParserOptions> = ConfigKey::new("body_raw_parser");
pub const STATIC_TYPED_RESOLVER: ConfigKey<dyn StaticTypedResolver> =
    ConfigKey::new("static_typed_resolver");

#[derive(Clone)]
enum OptionValue {
    /// Plain data bag, merged field by field on update.
    Data(Value),
    /// Opaque instance, replaced wholesale on update.
    Instance(Erased),
}

/// Process-wide keyed store of option objects.
///
/// ```
/// use trestle::config::{ConfigContainer, JSON_RESULT_OPTIONS};
/// use serde_json::json;
///
/// let configs = ConfigContainer::with_defaults();
/// configs.set(&JSON_RESULT_OPTIONS, &json!({ "key_case": "camel" })).unwrap();
///
/// let options = configs.get(&JSON_RESULT_OPTIONS).unwrap();
/// assert_eq!(options.indentation, Some(true));
/// ```
#[derive(Clone, Default)]
pub struct ConfigContainer {
    options: Arc<DashMap<&'static str, OptionValue>>,
}

impl ConfigContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A container pre-filled with the built-in option defaults.
    pub fn with_defaults() -> Self {
        let configs = Self::new();
        configs.seed(&JSON_RESULT_OPTIONS, JsonResultOptions::defaults());
        configs.seed(&BODY_JSON_PARSER, JsonParserOptions::default());
        configs.seed(&BODY_URLENCODED_PARSER, UrlEncodedParserOptions::default());
        configs.seed(&BODY_TEXT_PARSER, TextParserOptions::default());
        configs.seed(&BODY_RAW_PARSER, RawParserOptions::default());
        configs.set_instance(
            &STATIC_TYPED_RESOLVER,
            Arc::new(SerdeResolver) as Arc<dyn StaticTypedResolver>,
        );
        configs
    }

    fn seed<V: Serialize>(&self, key: &ConfigKey<V>, value: V) {
        if let Err(e) = self.set(key, &value) {
            tracing::error!("Failed to seed default options for {}: {}", key.name(), e);
        }
    }

    /// Merge a plain data bag into the option stored under `key`.
    ///
    /// When both the stored and the incoming value are objects the incoming
    /// fields overwrite the stored ones and the rest survive. Anything else
    /// replaces the stored value. `value` may be a partial shape of `V`, such as
    /// a `json!` literal.
    pub fn set<V: ?Sized, S: Serialize + ?Sized>(&self, key: &ConfigKey<V>, value: &S) -> Result<()> {
        let incoming = serde_json::to_value(value).map_err(|e| {
            TrestleError::configuration(format!("option '{}' is not serializable: {}", key.name(), e))
        })?;

        let mut entry = self
            .options
            .entry(key.name())
            .or_insert_with(|| OptionValue::Data(Value::Null));
        match (entry.value_mut(), incoming) {
            (OptionValue::Data(Value::Object(current)), Value::Object(patch)) => {
                for (field, v) in patch {
                    current.insert(field, v);
                }
            }
            (slot, incoming) => *slot = OptionValue::Data(incoming),
        }
        tracing::debug!("Options updated: {}", key.name());
        Ok(())
    }

    /// Store an opaque instance under `key`, replacing whatever was there.
    pub fn set_instance<V>(&self, key: &ConfigKey<V>, value: Arc<V>)
    where
        V: ?Sized + Send + Sync + 'static,
    {
        self.options
            .insert(key.name(), OptionValue::Instance(erase(value)));
        tracing::debug!("Options replaced: {}", key.name());
    }

    /// Read a data option. Returns `None` when absent, stored as an instance,
    /// or not deserializable into `V`.
    pub fn get<V: DeserializeOwned>(&self, key: &ConfigKey<V>) -> Option<V> {
        let value = match self.options.get(key.name())?.value() {
            OptionValue::Data(value) => value.clone(),
            OptionValue::Instance(_) => return None,
        };
        serde_json::from_value(value)
            .map_err(|e| tracing::warn!("Option {} has an unexpected shape: {}", key.name(), e))
            .ok()
    }

    pub fn get_or_default<V: DeserializeOwned + Default>(&self, key: &ConfigKey<V>) -> V {
        self.get(key).unwrap_or_default()
    }

    pub fn get_instance<V>(&self, key: &ConfigKey<V>) -> Option<Arc<V>>
    where
        V: ?Sized + Send + Sync + 'static,
    {
        let erased = match self.options.get(key.name())?.value() {
            OptionValue::Instance(erased) => Arc::clone(erased),
            OptionValue::Data(_) => return None,
        };
        downcast(&ProvideKey::named(key.name()), erased).ok()
    }

    /// Raw JSON view of a data option.
    pub fn get_value(&self, name: &str) -> Option<Value> {
        match self.options.get(name)?.value() {
            OptionValue::Data(value) => Some(value.clone()),
            OptionValue::Instance(_) => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}
