use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An untyped key → value bag used as entity construction input.
///
/// Keys are path-like: `"owner.name"` first matches a literal `"owner.name"`
/// key, then walks nested objects (`{"owner": {"name": ..}}`). Reading an
/// absent key never fails; it yields the caller's default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes {
    inner: Map<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level key. Chainable.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.inner.insert(key.to_string(), value.into());
        self
    }

    /// Look up a path. `null` counts as absent.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.inner.get(path) {
            return non_null(v);
        }
        let mut segments = path.split('.');
        let mut current = self.inner.get(segments.next()?)?;
        for seg in segments {
            current = current.as_object()?.get(seg)?;
        }
        non_null(current)
    }

    /// String value at `path`. Numbers and booleans are rendered; anything
    /// else (including absence) yields `default`.
    pub fn get_string(&self, path: &str, default: &str) -> String {
        match self.get(path) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// Like [`get_string`](Self::get_string) but empty or absent is `None`.
    pub fn get_opt_string(&self, path: &str) -> Option<String> {
        let s = self.get_string(path, "");
        if s.is_empty() { None } else { Some(s) }
    }

    /// Integer value at `path`. Numeric strings are parsed.
    pub fn get_i64(&self, path: &str, default: i64) -> i64 {
        match self.get(path) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn non_null(v: &Value) -> Option<&Value> {
    if v.is_null() { None } else { Some(v) }
}

impl From<Map<String, Value>> for Attributes {
    fn from(inner: Map<String, Value>) -> Self {
        Self { inner }
    }
}

/// Non-object values produce an empty bag.
impl From<Value> for Attributes {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self { inner },
            _ => Self::default(),
        }
    }
}
