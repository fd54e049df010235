use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SidelineError;

fn default_number_of_consumers() -> u32 {
    1
}

fn default_auto_commit_interval_ms() -> u64 {
    15_000
}

fn default_tuple_buffer_max_size() -> usize {
    10_000
}

/// Connection and consumption configuration for one sideline consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidelineConfig {
    /// Ordered list of host:port strings.
    pub broker_hosts: Vec<String>,
    /// Stable identity this consumer's persisted offsets are keyed by.
    pub consumer_id: String,
    /// Single source topic.
    pub topic: String,
    /// How many peer consumers the topic's partitions are sharded across.
    #[serde(default = "default_number_of_consumers")]
    pub number_of_consumers: u32,
    /// This consumer's shard index, 0 <= index < number_of_consumers.
    #[serde(default)]
    pub index_of_consumer: u32,
    #[serde(default)]
    pub consumer_state_auto_commit: bool,
    #[serde(default = "default_auto_commit_interval_ms")]
    pub consumer_state_auto_commit_interval_ms: u64,
    /// Capacity of the staging FIFO between fetch and `next_record`.
    #[serde(default = "default_tuple_buffer_max_size")]
    pub tuple_buffer_max_size: usize,
    #[serde(default)]
    pub ssl_enabled: bool,
    pub ssl_ca_path: Option<String>,
    pub ssl_cert_path: Option<String>,
    pub ssl_key_path: Option<String>,
}

impl Default for SidelineConfig {
    fn default() -> Self {
        Self {
            broker_hosts: vec!["localhost:9092".into()],
            consumer_id: "".into(),
            topic: "".into(),
            number_of_consumers: 1,
            index_of_consumer: 0,
            consumer_state_auto_commit: false,
            consumer_state_auto_commit_interval_ms: 15_000,
            tuple_buffer_max_size: 10_000,
            ssl_enabled: false,
            ssl_ca_path: None,
            ssl_cert_path: None,
            ssl_key_path: None,
        }
    }
}

impl SidelineConfig {
    /// Build a config from a loosely-typed option map.
    ///
    /// Integer options are accepted in either 32- or 64-bit representation;
    /// `serde_json::Number` carries both. Unknown keys are ignored.
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Result<Self, SidelineError> {
        let mut config = Self {
            broker_hosts: require_hosts(map, "broker_hosts")?,
            consumer_id: require_string(map, "consumer_id")?,
            topic: require_string(map, "topic")?,
            ..Self::default()
        };
        if let Some(n) = optional_uint(map, "number_of_consumers")? {
            config.number_of_consumers = n as u32;
        }
        if let Some(i) = optional_uint(map, "index_of_consumer")? {
            config.index_of_consumer = i as u32;
        }
        if let Some(Value::Bool(b)) = map.get("consumer_state_auto_commit") {
            config.consumer_state_auto_commit = *b;
        }
        if let Some(ms) = optional_uint(map, "consumer_state_auto_commit_interval_ms")? {
            config.consumer_state_auto_commit_interval_ms = ms;
        }
        if let Some(size) = optional_uint(map, "tuple_buffer_max_size")? {
            config.tuple_buffer_max_size = size as usize;
        }
        if let Some(Value::Bool(b)) = map.get("ssl_enabled") {
            config.ssl_enabled = *b;
        }
        config.ssl_ca_path = optional_string(map, "ssl_ca_path");
        config.ssl_cert_path = optional_string(map, "ssl_cert_path");
        config.ssl_key_path = optional_string(map, "ssl_key_path");
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SidelineError> {
        if self.broker_hosts.is_empty() {
            return Err(SidelineError::Config("broker_hosts must not be empty".into()));
        }
        if self.consumer_id.is_empty() {
            return Err(SidelineError::Config("consumer_id is required".into()));
        }
        if self.topic.is_empty() {
            return Err(SidelineError::Config("topic is required".into()));
        }
        if self.number_of_consumers < 1 {
            return Err(SidelineError::Config("number_of_consumers must be >= 1".into()));
        }
        if self.index_of_consumer >= self.number_of_consumers {
            return Err(SidelineError::Config(format!(
                "index_of_consumer {} out of range for {} consumers",
                self.index_of_consumer, self.number_of_consumers
            )));
        }
        if self.tuple_buffer_max_size < 1 {
            return Err(SidelineError::Config("tuple_buffer_max_size must be positive".into()));
        }
        Ok(())
    }

    /// Comma-joined host list in the form librdkafka expects.
    pub fn bootstrap_servers(&self) -> String {
        self.broker_hosts.join(",")
    }
}

fn require_string(map: &serde_json::Map<String, Value>, key: &str) -> Result<String, SidelineError> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(_) => Err(SidelineError::Config(format!("{key} must be a non-empty string"))),
        None => Err(SidelineError::Config(format!("{key} is required"))),
    }
}

fn optional_string(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Hosts may arrive as a list of strings or a single comma-separated string.
fn require_hosts(map: &serde_json::Map<String, Value>, key: &str) -> Result<Vec<String>, SidelineError> {
    let hosts = match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                _ => Err(SidelineError::Config(format!("{key} entries must be strings"))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::String(s)) => s.split(',').map(|h| h.trim().to_string()).collect(),
        Some(_) => return Err(SidelineError::Config(format!("{key} must be a list of host:port strings"))),
        None => return Err(SidelineError::Config(format!("{key} is required"))),
    };
    Ok(hosts)
}

fn optional_uint(map: &serde_json::Map<String, Value>, key: &str) -> Result<Option<u64>, SidelineError> {
    match map.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| SidelineError::Config(format!("{key} must be a non-negative integer"))),
        Some(_) => Err(SidelineError::Config(format!("{key} must be an integer"))),
        None => Ok(None),
    }
}
