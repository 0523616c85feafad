//! Shipper configuration.
//!
//! A [`ShipperConfig`] is fixed for the lifetime of a
//! [`MetricsLogger`](crate::logger::MetricsLogger); there is no hot reload.
//! Invalid values are rejected by [`ShipperConfig::validate`] before the
//! logger starts, never silently defaulted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::enrich::EnvFields;
use crate::error::{ConfigError, Result};
use crate::naming::{DestinationNamer, RotationFrequency};

/// Default number of buffered documents that triggers a flush.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default interval between time-triggered flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Default destination prefix.
pub const DEFAULT_INDEX_PREFIX: &str = "metrics";

/// Configuration for a [`MetricsLogger`](crate::logger::MetricsLogger).
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use metricship::config::ShipperConfig;
/// use metricship::enrich::EnvFields;
/// use metricship::naming::RotationFrequency;
/// use serde_json::json;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ShipperConfig::new("app_metrics")
///     .with_buffer_size(500)
///     .with_flush_interval(Duration::from_millis(250))
///     .with_rotation(RotationFrequency::Weekly)
///     .with_additional_fields(json!({ "service": { "name": "billing" } }))
///     .with_env_fields(EnvFields::new().with_var("environment", "DEPLOY_ENV"))
///     .with_fallback_dir("/var/spool/metricship");
/// config.validate()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Number of buffered documents that triggers an immediate flush.
    pub buffer_size: usize,

    /// Interval between time-triggered flushes.
    #[serde(rename = "flush_interval_ms", with = "duration_ms")]
    pub flush_interval: Duration,

    /// Prefix of every destination name.
    pub index_prefix: String,

    /// How often the destination name rolls over.
    pub rotation: RotationFrequency,

    /// Static fields copied into every document. Must be a JSON object;
    /// values may be nested objects.
    pub additional_fields: Value,

    /// Fields resolved from environment variables for every document.
    pub env_fields: EnvFields,

    /// Directory receiving batches the sink could not accept.
    ///
    /// When `None`, failed batches are dropped and only logged.
    pub fallback_dir: Option<PathBuf>,

    /// Whether to stamp `ecs`, `agent` and `host` metadata into documents.
    pub ecs_metadata: bool,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            rotation: RotationFrequency::default(),
            additional_fields: Value::Object(Map::new()),
            env_fields: EnvFields::new(),
            fallback_dir: None,
            ecs_metadata: true,
        }
    }
}

impl ShipperConfig {
    /// Creates a config with defaults and the given destination prefix.
    ///
    /// Defaults: 1000 documents, 1s flush interval, daily rotation, no
    /// fallback directory, ECS metadata enabled.
    pub fn new(index_prefix: impl Into<String>) -> Self {
        Self {
            index_prefix: index_prefix.into(),
            ..Self::default()
        }
    }

    /// Sets the size threshold.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets the flush interval.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Sets the rotation frequency.
    #[must_use]
    pub fn with_rotation(mut self, rotation: RotationFrequency) -> Self {
        self.rotation = rotation;
        self
    }

    /// Sets the static additional fields.
    #[must_use]
    pub fn with_additional_fields(mut self, fields: Value) -> Self {
        self.additional_fields = fields;
        self
    }

    /// Sets the environment-resolved fields.
    #[must_use]
    pub fn with_env_fields(mut self, env_fields: EnvFields) -> Self {
        self.env_fields = env_fields;
        self
    }

    /// Enables the disk fallback in `dir`.
    #[must_use]
    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = Some(dir.into());
        self
    }

    /// Enables or disables the built-in ECS metadata fields.
    #[must_use]
    pub fn with_ecs_metadata(mut self, enabled: bool) -> Self {
        self.ecs_metadata = enabled;
        self
    }

    /// Loads a config from a JSON file and validates it.
    ///
    /// Missing keys take their default values. `rotation` is matched
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::Config`](crate::error::ShipError::Config) if the
    /// file cannot be read or parsed, names an unknown rotation, or if the
    /// resulting config is invalid.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let parse_error = |e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        };

        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut value: Value = serde_json::from_str(&data).map_err(parse_error)?;

        // Parsed separately so an unknown name is reported as such.
        let rotation = match value.as_object_mut().and_then(|f| f.remove("rotation")) {
            Some(Value::String(raw)) => Some(raw.parse::<RotationFrequency>()?),
            Some(other) => Some(serde_json::from_value(other).map_err(parse_error)?),
            None => None,
        };

        let mut config: Self = serde_json::from_value(value).map_err(parse_error)?;
        if let Some(rotation) = rotation {
            config.rotation = rotation;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::Config`](crate::error::ShipError::Config) if:
    /// - `buffer_size` is zero
    /// - `flush_interval` is zero
    /// - `index_prefix` is empty
    /// - `additional_fields` is not a JSON object
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize {
                size: self.buffer_size,
            }
            .into());
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidFlushInterval.into());
        }

        if self.index_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyIndexPrefix.into());
        }

        if !self.additional_fields.is_object() {
            return Err(ConfigError::FieldsNotObject {
                kind: json_kind(&self.additional_fields),
            }
            .into());
        }

        Ok(())
    }

    /// Builds the destination namer for this config.
    pub fn namer(&self) -> DestinationNamer {
        DestinationNamer::new(self.index_prefix.clone(), self.rotation)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Serializes a [`Duration`] as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShipError;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ShipperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_size, 1000);
        assert_eq!(config.flush_interval, Duration::from_secs(1));
        assert_eq!(config.rotation, RotationFrequency::Daily);
        assert!(config.fallback_dir.is_none());
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let result = ShipperConfig::new("m").with_buffer_size(0).validate();
        assert!(matches!(
            result,
            Err(ShipError::Config(ConfigError::InvalidBufferSize { size: 0 }))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = ShipperConfig::new("m")
            .with_flush_interval(Duration::ZERO)
            .validate();
        assert!(matches!(
            result,
            Err(ShipError::Config(ConfigError::InvalidFlushInterval))
        ));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let result = ShipperConfig::new("  ").validate();
        assert!(matches!(
            result,
            Err(ShipError::Config(ConfigError::EmptyIndexPrefix))
        ));
    }

    #[test]
    fn test_non_object_fields_rejected() {
        let result = ShipperConfig::new("m")
            .with_additional_fields(json!(["a", "b"]))
            .validate();
        assert!(matches!(
            result,
            Err(ShipError::Config(ConfigError::FieldsNotObject { kind: "an array" }))
        ));
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shipper.json");
        std::fs::write(
            &path,
            r#"{
                "buffer_size": 50,
                "flush_interval_ms": 250,
                "index_prefix": "app_metrics",
                "rotation": "WEEKLY",
                "additional_fields": { "app": "billing" },
                "env_fields": { "environment": "DEPLOY_ENV" },
                "fallback_dir": "/tmp/failed"
            }"#,
        )
        .unwrap();

        let config = ShipperConfig::from_json_file(&path).unwrap();

        assert_eq!(config.buffer_size, 50);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.index_prefix, "app_metrics");
        assert_eq!(config.rotation, RotationFrequency::Weekly);
        assert_eq!(config.additional_fields, json!({ "app": "billing" }));
        assert_eq!(
            config.env_fields,
            EnvFields::new().with_var("environment", "DEPLOY_ENV")
        );
        assert_eq!(config.fallback_dir, Some(PathBuf::from("/tmp/failed")));
        assert!(config.ecs_metadata);
    }

    #[test]
    fn test_from_json_file_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shipper.json");
        std::fs::write(&path, r#"{ "buffer_size": 0 }"#).unwrap();

        let result = ShipperConfig::from_json_file(&path);
        assert!(matches!(
            result,
            Err(ShipError::Config(ConfigError::InvalidBufferSize { .. }))
        ));
    }

    #[test]
    fn test_from_json_file_rotation_ignores_case() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shipper.json");
        std::fs::write(&path, r#"{ "rotation": "Weekly" }"#).unwrap();

        let config = ShipperConfig::from_json_file(&path).unwrap();
        assert_eq!(config.rotation, RotationFrequency::Weekly);
    }

    #[test]
    fn test_from_json_file_unknown_rotation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shipper.json");
        std::fs::write(&path, r#"{ "rotation": "Hourly" }"#).unwrap();

        let result = ShipperConfig::from_json_file(&path);
        assert!(matches!(
            result,
            Err(ShipError::Config(ConfigError::UnknownRotation { value })) if value == "Hourly"
        ));
    }

    #[test]
    fn test_from_json_file_missing() {
        let dir = tempdir().unwrap();
        let result = ShipperConfig::from_json_file(dir.path().join("nope.json"));
        assert!(matches!(result, Err(ShipError::Config(ConfigError::Read { .. }))));
    }
}
