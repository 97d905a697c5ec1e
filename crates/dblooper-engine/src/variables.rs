//! External variables substituted into statement templates at compile time.
//!
//! Placeholders are written `$${<T><name>}$$` where `<T>` is the expected
//! type: `S` string, `I` integer, `D` double.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag of a variable placeholder or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    String,
    Integer,
    Double,
}

impl VariableKind {
    /// Parse the one-letter placeholder tag.
    #[must_use]
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'S' => Some(Self::String),
            'I' => Some(Self::Integer),
            'D' => Some(Self::Double),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Integer(i64),
    Double(f64),
    String(String),
}

impl VariableValue {
    #[must_use]
    pub fn kind(&self) -> VariableKind {
        match self {
            Self::Integer(_) => VariableKind::Integer,
            Self::Double(_) => VariableKind::Double,
            Self::String(_) => VariableKind::String,
        }
    }

    /// Literal text for a placeholder of type `expected`.
    ///
    /// Integers widen into double placeholders; every other mismatch is
    /// rejected.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn render_as(&self, expected: VariableKind) -> Option<String> {
        match (self, expected) {
            (Self::String(s), VariableKind::String) => Some(s.clone()),
            (Self::Integer(v), VariableKind::Integer) => Some(v.to_string()),
            (Self::Integer(v), VariableKind::Double) => Some(format!("{:?}", *v as f64)),
            (Self::Double(v), VariableKind::Double) => Some(format!("{v:?}")),
            _ => None,
        }
    }
}

impl From<&str> for VariableValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<i64> for VariableValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for VariableValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

/// Looks up variables by name.
pub trait VariableResolver {
    fn resolve(&self, name: &str) -> Option<VariableValue>;
}

/// Resolver with no variables defined.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVariables;

impl VariableResolver for NoVariables {
    fn resolve(&self, _name: &str) -> Option<VariableValue> {
        None
    }
}

/// Variables from an explicit name → value map (the job file's `variables:`).
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    vars: BTreeMap<String, VariableValue>,
}

impl MapResolver {
    #[must_use]
    pub fn new(vars: BTreeMap<String, VariableValue>) -> Self {
        Self { vars }
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl VariableResolver for MapResolver {
    fn resolve(&self, name: &str) -> Option<VariableValue> {
        self.vars.get(name).cloned()
    }
}

/// Process environment variables, always typed as strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvResolver;

impl VariableResolver for EnvResolver {
    fn resolve(&self, name: &str) -> Option<VariableValue> {
        std::env::var(name).ok().map(VariableValue::String)
    }
}

/// Tries each resolver in order; the first hit wins.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn VariableResolver + Send + Sync>>,
}

impl ChainResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(mut self, resolver: impl VariableResolver + Send + Sync + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

impl VariableResolver for ChainResolver {
    fn resolve(&self, name: &str) -> Option<VariableValue> {
        self.resolvers.iter().find_map(|r| r.resolve(name))
    }
}
