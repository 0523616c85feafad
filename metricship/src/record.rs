//! Building documents from timed measurements.
//!
//! Each document contains, in increasing precedence:
//!
//! 1. the configured static `additional_fields`,
//! 2. the built-in `ecs` / `agent` / `host` metadata (when enabled), which
//!    keeps any other keys the static fields put in those objects,
//! 3. fields resolved from the environment at build time,
//! 4. the mandatory `@timestamp` and `metrics` fields.

use std::net::{IpAddr, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Local};
use serde_json::{Map, Value, json};

use crate::config::ShipperConfig;
use crate::document::{Document, merge_into};
use crate::enrich::{EnvFields, EnvSource};

/// ECS schema version the built-in metadata conforms to.
pub const ECS_VERSION: &str = "1.4.0";

/// Value of `agent.type` in built-in metadata.
pub const AGENT_TYPE: &str = "metricship";

/// Value of `agent.version` in built-in metadata.
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A completed timed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMeasurement {
    /// Metric name.
    pub name: String,
    /// Wall-clock start of the operation.
    pub start: DateTime<Local>,
    /// Wall-clock end of the operation.
    pub end: DateTime<Local>,
    /// Elapsed time.
    pub duration: Duration,
}

impl TimedMeasurement {
    /// Creates a measurement from a start time and an explicit duration.
    ///
    /// The end time is derived as `start + duration`.
    pub fn new(name: impl Into<String>, start: DateTime<Local>, duration: Duration) -> Self {
        let end = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| start.checked_add_signed(delta))
            .unwrap_or(start);
        Self {
            name: name.into(),
            start,
            end,
            duration,
        }
    }

    /// Elapsed time in whole microseconds, saturating at `u64::MAX`.
    pub fn duration_us(&self) -> u64 {
        u64::try_from(self.duration.as_micros()).unwrap_or(u64::MAX)
    }
}

/// Formats a timestamp the way the document store expects:
/// `YYYY-MM-DDTHH:MM:SS.mmm±hhmm`.
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string()
}

/// Turns measurements into documents using a fixed configuration snapshot.
pub struct RecordBuilder {
    /// Static fields and metadata, computed once.
    base: Map<String, Value>,
    env_fields: EnvFields,
    env: Arc<dyn EnvSource>,
}

impl std::fmt::Debug for RecordBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBuilder")
            .field("base", &self.base)
            .field("env_fields", &self.env_fields)
            .finish_non_exhaustive()
    }
}

impl RecordBuilder {
    /// Creates a builder from `config`, resolving environment fields through `env`.
    ///
    /// A non-object `additional_fields` value is ignored here;
    /// [`ShipperConfig::validate`] rejects it before a logger is built.
    pub fn new(config: &ShipperConfig, env: Arc<dyn EnvSource>) -> Self {
        let mut base = config
            .additional_fields
            .as_object()
            .cloned()
            .unwrap_or_default();

        if config.ecs_metadata {
            merge_into(&mut base, ecs_metadata());
        }

        Self {
            base,
            env_fields: config.env_fields.clone(),
            env,
        }
    }

    /// Builds the document for `measurement`.
    ///
    /// Environment variables are read on every call, so changes to the
    /// environment between calls show up in later documents.
    pub fn build(&self, measurement: &TimedMeasurement) -> Document {
        let mut fields = self.base.clone();

        if !self.env_fields.is_empty() {
            merge_into(&mut fields, self.env_fields.resolve(self.env.as_ref()));
        }

        fields.insert(
            "@timestamp".to_string(),
            Value::String(format_timestamp(&measurement.start)),
        );
        fields.insert(
            "metrics".to_string(),
            json!({
                "name": measurement.name,
                "time": { "us": measurement.duration_us() },
            }),
        );

        Document::from_fields(fields)
    }
}

/// Host identity, detected once per process.
#[derive(Debug, Clone)]
struct HostInfo {
    name: String,
    ip: Option<String>,
}

fn host_info() -> &'static HostInfo {
    static HOST: OnceLock<HostInfo> = OnceLock::new();
    HOST.get_or_init(|| {
        let name = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        let ip = (name.as_str(), 0)
            .to_socket_addrs()
            .ok()
            .and_then(|addrs| preferred_ip(addrs.map(|addr| addr.ip())))
            .map(|ip| ip.to_string());
        HostInfo { name, ip }
    })
}

/// The first IPv4 address, or the first address of any kind.
fn preferred_ip(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut first = None;
    for ip in addrs {
        if ip.is_ipv4() {
            return Some(ip);
        }
        first.get_or_insert(ip);
    }
    first
}

/// Built-in `ecs`, `agent` and `host` fields for a new builder.
///
/// `agent.ephemeral_id` is fresh for every call, so each logger carries its
/// own identifier.
fn ecs_metadata() -> Map<String, Value> {
    let host = host_info();

    let mut host_fields = Map::new();
    host_fields.insert("hostname".to_string(), json!(host.name));
    host_fields.insert("name".to_string(), json!(host.name));
    host_fields.insert("id".to_string(), json!(host.name));
    if let Some(ip) = &host.ip {
        host_fields.insert("ip".to_string(), json!(ip));
    }

    let mut metadata = Map::new();
    metadata.insert("ecs".to_string(), json!({ "version": ECS_VERSION }));
    metadata.insert(
        "agent".to_string(),
        json!({
            "ephemeral_id": uuid::Uuid::new_v4().to_string(),
            "type": AGENT_TYPE,
            "version": AGENT_VERSION,
        }),
    );
    metadata.insert("host".to_string(), Value::Object(host_fields));
    metadata
}
