//! Hook point definitions and the context threaded through a hook chain.
//!
//! Hook names are open strings: any plugin may declare a custom hook. The
//! well-known points below additionally document the JSON type of the keys
//! they carry, and the dispatcher rejects plugin output that contradicts it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known hook points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Fired before a request is handled. Plugins may tag or block it.
    BeforeRequest,
    /// Fired after a request has been handled.
    AfterRequest,
    /// Fired when the embedding application reports an error.
    OnError,
    /// Fired once when the host has finished loading plugins.
    OnStartup,
    /// Fired once before the host unloads plugins.
    OnShutdown,
}

/// JSON type expected for a documented context key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// JSON string.
    String,
    /// JSON integer (signed or unsigned).
    Integer,
    /// JSON boolean.
    Bool,
    /// JSON object.
    Object,
}

impl ValueKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::Object => value.is_object(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Bool => "bool",
            Self::Object => "object",
        }
    }
}

const BEFORE_REQUEST_KEYS: &[(&str, ValueKind)] = &[
    ("method", ValueKind::String),
    ("path", ValueKind::String),
    ("headers", ValueKind::Object),
    ("request_id", ValueKind::String),
    ("blocked", ValueKind::Bool),
    ("block_reason", ValueKind::String),
    ("started_at", ValueKind::String),
];

const AFTER_REQUEST_KEYS: &[(&str, ValueKind)] = &[
    ("status", ValueKind::Integer),
    ("duration_ms", ValueKind::Integer),
    ("request_id", ValueKind::String),
    ("started_at", ValueKind::String),
];

const ON_ERROR_KEYS: &[(&str, ValueKind)] = &[("error", ValueKind::String)];

const LIFECYCLE_KEYS: &[(&str, ValueKind)] = &[("host", ValueKind::String)];

impl HookPoint {
    /// Every well-known hook point.
    pub const ALL: [HookPoint; 5] = [
        Self::BeforeRequest,
        Self::AfterRequest,
        Self::OnError,
        Self::OnStartup,
        Self::OnShutdown,
    ];

    /// Returns the string name of the hook point.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeRequest => "before_request",
            Self::AfterRequest => "after_request",
            Self::OnError => "on_error",
            Self::OnStartup => "on_startup",
            Self::OnShutdown => "on_shutdown",
        }
    }

    /// Resolves a hook name to a well-known point, if it is one.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|point| point.as_str() == name)
    }

    /// Documented keys and their JSON types.
    pub fn documented_keys(&self) -> &'static [(&'static str, ValueKind)] {
        match self {
            Self::BeforeRequest => BEFORE_REQUEST_KEYS,
            Self::AfterRequest => AFTER_REQUEST_KEYS,
            Self::OnError => ON_ERROR_KEYS,
            Self::OnStartup | Self::OnShutdown => LIFECYCLE_KEYS,
        }
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The mutable key-value bag passed down a hook chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookContext {
    data: Map<String, Value>,
}

impl HookContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self { data }),
            _ => None,
        }
    }

    /// Inserts a value.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Inserts a string value.
    pub fn with_string(self, key: &str, value: &str) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts an integer value.
    pub fn with_int(self, key: &str, value: i64) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts a boolean value.
    pub fn with_bool(self, key: &str, value: bool) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts or replaces a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(key.into(), value)
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Gets a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Gets an i64 value.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Gets a bool value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the context has no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Converts into a JSON object value.
    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    /// Checks the documented keys of a well-known hook.
    ///
    /// Missing keys are fine; present keys must have the documented type.
    /// Custom hooks have no contract and always pass.
    pub fn check_contract(&self, hook: &str) -> Result<(), String> {
        let Some(point) = HookPoint::from_name(hook) else {
            return Ok(());
        };

        for (key, kind) in point.documented_keys() {
            if let Some(value) = self.data.get(*key) {
                if !kind.matches(value) {
                    return Err(format!("key '{}' must be {}, got {}", key, kind.as_str(), value));
                }
            }
        }
        Ok(())
    }
}

impl From<Map<String, Value>> for HookContext {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}
