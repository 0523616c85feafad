//! Per-document field enrichment from environment variables.
//!
//! An [`EnvFields`] tree maps document field names to environment variable
//! names. At build time each variable is looked up through an [`EnvSource`];
//! variables that are not set contribute nothing, so the static value for the
//! same field (if any) is kept, and otherwise the field is absent.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Source of environment values, looked up once per document.
pub trait EnvSource: Send + Sync {
    /// Returns the value of variable `name`, or `None` if it is not set.
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// One entry of an [`EnvFields`] tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvField {
    /// The field takes the value of this environment variable.
    Var(String),
    /// A nested object of further field mappings.
    Nested(EnvFields),
}

/// Mapping of document fields to the environment variables that supply them.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use metricship::enrich::EnvFields;
///
/// let fields = EnvFields::new()
///     .with_var("environment", "DEPLOY_ENV")
///     .with_nested("service", EnvFields::new().with_var("version", "SERVICE_VERSION"));
///
/// let env = HashMap::from([("DEPLOY_ENV".to_string(), "staging".to_string())]);
/// let resolved = fields.resolve(&env);
///
/// assert_eq!(resolved["environment"], "staging");
/// assert!(!resolved.contains_key("service"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvFields(BTreeMap<String, EnvField>);

impl EnvFields {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `field` to environment variable `var`.
    #[must_use]
    pub fn with_var(mut self, field: impl Into<String>, var: impl Into<String>) -> Self {
        self.0.insert(field.into(), EnvField::Var(var.into()));
        self
    }

    /// Maps `field` to a nested object of further mappings.
    #[must_use]
    pub fn with_nested(mut self, field: impl Into<String>, nested: EnvFields) -> Self {
        self.0.insert(field.into(), EnvField::Nested(nested));
        self
    }

    /// Returns `true` if no fields are mapped.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves every mapped variable that is currently set.
    ///
    /// Unset variables are skipped, and nested objects that end up empty are
    /// dropped, so the result only contains fields that have a value.
    pub fn resolve(&self, env: &dyn EnvSource) -> Map<String, Value> {
        let mut resolved = Map::new();
        for (field, entry) in &self.0 {
            match entry {
                EnvField::Var(var) => {
                    if let Some(value) = env.lookup(var) {
                        resolved.insert(field.clone(), Value::String(value));
                    }
                }
                EnvField::Nested(nested) => {
                    let inner = nested.resolve(env);
                    if !inner.is_empty() {
                        resolved.insert(field.clone(), Value::Object(inner));
                    }
                }
            }
        }
        resolved
    }
}
