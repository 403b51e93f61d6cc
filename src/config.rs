// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Configuration
//!
//! This module defines the typed configuration records consumed by the registries:
//! connections, queues, exchanges and producers, each keyed by a logical name.
//! Records are deserialized with serde (camelCase keys) and every field carries the
//! same default the broker-facing layer expects when it is omitted.
//!
//! [`Config::load`] is the full load pipeline: parse, validate, then run the
//! dead-letter retry expansion so the registries never see a `dlx` field.

use crate::{
    dlx,
    errors::AmqpError,
    exchange::ExchangeKind,
    topology::{
        AMQP_HEADERS_MAX_LENGTH, AMQP_HEADERS_MAX_LENGTH_BYTES, AMQP_HEADERS_MESSAGE_TTL,
    },
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use serde::{de::Error as _, Deserialize, Deserializer};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, error};

/// Name of the connection used when a queue or exchange does not name one
pub const DEFAULT_CONNECTION: &str = "default";
/// Content type set on published messages when the producer does not override it
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

const MIN_HEARTBEAT_SECS: f64 = 1.0;
/// AMQP negotiates the heartbeat as an unsigned short number of seconds.
const MAX_HEARTBEAT_SECS: f64 = u16::MAX as f64;
const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// A scalar or nested table used for queue, exchange and binding arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Table(BTreeMap<String, ArgumentValue>),
}

impl ArgumentValue {
    /// Converts the value into its AMQP field representation.
    pub fn to_amqp(&self) -> AMQPValue {
        match self {
            ArgumentValue::Bool(v) => AMQPValue::Boolean(*v),
            ArgumentValue::Int(v) => AMQPValue::LongLongInt(*v),
            ArgumentValue::Float(v) => AMQPValue::Double(*v),
            ArgumentValue::String(v) => AMQPValue::LongString(LongString::from(v.as_str())),
            ArgumentValue::Table(v) => AMQPValue::FieldTable(field_table(v)),
        }
    }
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        ArgumentValue::String(value.to_owned())
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        ArgumentValue::String(value)
    }
}

impl From<i64> for ArgumentValue {
    fn from(value: i64) -> Self {
        ArgumentValue::Int(value)
    }
}

impl From<bool> for ArgumentValue {
    fn from(value: bool) -> Self {
        ArgumentValue::Bool(value)
    }
}

impl From<BTreeMap<String, ArgumentValue>> for ArgumentValue {
    fn from(value: BTreeMap<String, ArgumentValue>) -> Self {
        ArgumentValue::Table(value)
    }
}

/// Builds an AMQP field table out of configured arguments.
pub fn field_table(arguments: &BTreeMap<String, ArgumentValue>) -> FieldTable {
    let table: BTreeMap<ShortString, AMQPValue> = arguments
        .iter()
        .map(|(key, value)| (ShortString::from(key.as_str()), value.to_amqp()))
        .collect();

    FieldTable::from(table)
}

/// When the broker-side declaration of a queue or exchange is issued.
///
/// Accepts `true` (eager), `false` (none) or one of the names
/// `"eager"`, `"lazy"`, `"none"` in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "AutoCreateRepr")]
pub enum AutoCreate {
    /// Declared when the runtime object is created
    Eager,
    /// Declared on first publish or consume
    #[default]
    Lazy,
    /// Never declared, assumed to exist on the broker
    None,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AutoCreateRepr {
    Flag(bool),
    Named(String),
}

impl TryFrom<AutoCreateRepr> for AutoCreate {
    type Error = String;

    fn try_from(value: AutoCreateRepr) -> Result<Self, Self::Error> {
        match value {
            AutoCreateRepr::Flag(true) => Ok(AutoCreate::Eager),
            AutoCreateRepr::Flag(false) => Ok(AutoCreate::None),
            AutoCreateRepr::Named(name) => match name.as_str() {
                "eager" => Ok(AutoCreate::Eager),
                "lazy" => Ok(AutoCreate::Lazy),
                "none" => Ok(AutoCreate::None),
                other => Err(format!("unknown autoCreate policy `{other}`")),
            },
        }
    }
}

/// AMQP delivery mode for published messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum DeliveryMode {
    NonPersistent,
    #[default]
    Persistent,
}

impl DeliveryMode {
    pub fn as_u8(self) -> u8 {
        match self {
            DeliveryMode::NonPersistent => 1,
            DeliveryMode::Persistent => 2,
        }
    }
}

impl TryFrom<u8> for DeliveryMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DeliveryMode::NonPersistent),
            2 => Ok(DeliveryMode::Persistent),
            other => Err(format!("unknown delivery mode `{other}`")),
        }
    }
}

/// TLS options for a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// PEM bundle used to verify the broker certificate
    pub cafile: Option<PathBuf>,
}

/// Connection descriptor, one per logical connection name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    /// Heartbeat interval in seconds
    pub heartbeat: f64,
    /// Connect timeout in seconds
    pub timeout: f64,
    pub persistent: bool,
    pub path: String,
    pub tcp_no_delay: bool,
    /// Defer connecting until the first channel is requested
    pub lazy: bool,
    pub ssl: Option<TlsOptions>,
    pub publish_confirm: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: "127.0.0.1".to_owned(),
            port: 5672,
            user: "guest".to_owned(),
            password: "guest".to_owned(),
            vhost: "/".to_owned(),
            heartbeat: 60.0,
            timeout: 10.0,
            persistent: false,
            path: "/".to_owned(),
            tcp_no_delay: false,
            lazy: false,
            ssl: None,
            publish_confirm: false,
        }
    }
}

impl ConnectionConfig {
    /// Minimum spacing between two heartbeats sent by the connection manager.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.heartbeat.max(MIN_HEARTBEAT_SECS))
            .unwrap_or(Duration::MAX)
    }

    /// Read/write timeout enforced around transport I/O.
    pub fn read_write_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.heartbeat.max(self.timeout).max(0.0) * 2.0)
            .unwrap_or(Duration::MAX)
    }
}

/// Queue descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    pub connection: String,
    pub passive: bool,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    pub no_wait: bool,
    pub arguments: BTreeMap<String, ArgumentValue>,
    /// Retry delays in seconds, consumed by the DLX expansion. Entries may be
    /// given as integers or duration strings such as `"5 minutes"`.
    #[serde(deserialize_with = "retry_delays")]
    pub dlx: Option<Vec<i64>>,
    pub auto_create: AutoCreate,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::new(DEFAULT_CONNECTION)
    }
}

impl QueueConfig {
    /// Creates a durable, lazily declared queue descriptor on the given connection.
    pub fn new(connection: &str) -> QueueConfig {
        QueueConfig {
            connection: connection.to_owned(),
            passive: false,
            durable: true,
            exclusive: false,
            auto_delete: false,
            no_wait: false,
            arguments: BTreeMap::default(),
            dlx: None,
            auto_create: AutoCreate::Lazy,
        }
    }

    /// Sets when the queue is declared on the broker.
    ///
    /// # Parameters
    /// * `policy` - Eager, lazy or never
    ///
    /// # Returns
    /// Self for method chaining
    /// Sets when the exchange is declared on the broker.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn auto_create(mut self, policy: AutoCreate) -> Self {
        self.auto_create = policy;
        self
    }

    /// Makes the queue transient, dropped on broker restart.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Makes the queue exclusive to the connection.
    ///
    /// Exclusive queues are deleted when the connection closes.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Sets the queue to auto-delete when no longer used.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Only checks that the queue exists instead of creating it.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Adds a declaration argument, replacing any previous value under `key`.
    ///
    /// # Parameters
    /// * `key` - Argument name, such as `x-queue-type`
    /// * `value` - Scalar, list or table value
    ///
    /// # Returns
    /// Self for method chaining
    /// Adds a binding argument, such as the `x-match` of a headers exchange.
    /// Adds a declaration argument, replacing any previous value under `key`.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn argument(mut self, key: &str, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.insert(key.to_owned(), value.into());
        self
    }

    /// Sets the message Time-To-Live (TTL) of the queue.
    ///
    /// # Parameters
    /// * `ttl` - TTL in milliseconds
    ///
    /// # Returns
    /// Self for method chaining
    pub fn ttl(self, ttl: i64) -> Self {
        self.argument(AMQP_HEADERS_MESSAGE_TTL, ttl)
    }

    /// Sets the maximum number of messages the queue can hold.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn max_length(self, max: i64) -> Self {
        self.argument(AMQP_HEADERS_MAX_LENGTH, max)
    }

    /// Sets the maximum size in bytes the queue can hold.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn max_length_bytes(self, max_bytes: i64) -> Self {
        self.argument(AMQP_HEADERS_MAX_LENGTH_BYTES, max_bytes)
    }

    /// Attaches retry delays to be expanded into a dead-letter retry topology.
    ///
    /// # Parameters
    /// * `delays` - Delays in whole seconds, one wait queue each
    ///
    /// # Returns
    /// Self for method chaining
    pub fn dlx(mut self, delays: Vec<i64>) -> Self {
        self.dlx = Some(delays);
        self
    }
}

/// One binding from an exchange to a queue, keyed by queue name in [`ExchangeConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueBindingConfig {
    /// Routing keys; an empty set binds once with the empty key
    #[serde(deserialize_with = "one_or_many")]
    pub routing_key: Vec<String>,
    pub no_wait: bool,
    pub arguments: BTreeMap<String, ArgumentValue>,
}

impl QueueBindingConfig {
    /// Creates a binding without routing keys, bound once with the empty key.
    pub fn new() -> QueueBindingConfig {
        QueueBindingConfig::default()
    }

    /// Adds a routing key; the queue is bound once per key.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key.push(key.to_owned());
        self
    }

    pub fn argument(mut self, key: &str, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.insert(key.to_owned(), value.into());
        self
    }
}

/// Exchange descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExchangeConfig {
    pub connection: String,
    #[serde(rename = "type")]
    pub kind: ExchangeKind,
    pub passive: bool,
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: BTreeMap<String, ArgumentValue>,
    pub queue_bindings: BTreeMap<String, QueueBindingConfig>,
    pub auto_create: AutoCreate,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig::new(DEFAULT_CONNECTION, ExchangeKind::Direct)
    }
}

impl ExchangeConfig {
    /// Creates a durable, lazily declared exchange descriptor without bindings.
    pub fn new(connection: &str, kind: ExchangeKind) -> ExchangeConfig {
        ExchangeConfig {
            connection: connection.to_owned(),
            kind,
            passive: false,
            durable: true,
            auto_delete: false,
            internal: false,
            no_wait: false,
            arguments: BTreeMap::default(),
            queue_bindings: BTreeMap::default(),
            auto_create: AutoCreate::Lazy,
        }
    }

    pub fn auto_create(mut self, policy: AutoCreate) -> Self {
        self.auto_create = policy;
        self
    }

    pub fn argument(mut self, key: &str, value: impl Into<ArgumentValue>) -> Self {
        self.arguments.insert(key.to_owned(), value.into());
        self
    }

    /// Binds `queue` to the exchange, replacing an earlier binding of that queue.
    ///
    /// # Parameters
    /// * `queue` - Name of a configured queue
    /// * `binding` - Routing keys and arguments of the binding
    ///
    /// # Returns
    /// Self for method chaining
    pub fn binding(mut self, queue: &str, binding: QueueBindingConfig) -> Self {
        self.queue_bindings.insert(queue.to_owned(), binding);
        self
    }
}

/// Producer descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProducerConfig {
    pub exchange: Option<String>,
    pub queue: Option<String>,
    pub content_type: String,
    pub delivery_mode: DeliveryMode,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            exchange: None,
            queue: None,
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            delivery_mode: DeliveryMode::Persistent,
        }
    }
}

impl ProducerConfig {
    /// Creates a producer publishing persistent `text/plain` messages to `exchange`.
    pub fn to_exchange(exchange: &str) -> ProducerConfig {
        ProducerConfig {
            exchange: Some(exchange.to_owned()),
            ..ProducerConfig::default()
        }
    }

    /// Creates a producer publishing straight to `queue` through the default exchange.
    pub fn to_queue(queue: &str) -> ProducerConfig {
        ProducerConfig {
            queue: Some(queue.to_owned()),
            ..ProducerConfig::default()
        }
    }
}

/// The whole topology configuration, each section keyed by logical name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connections: BTreeMap<String, ConnectionConfig>,
    pub queues: BTreeMap<String, QueueConfig>,
    pub exchanges: BTreeMap<String, ExchangeConfig>,
    pub producers: BTreeMap<String, ProducerConfig>,
}

impl Config {
    /// Parses a JSON document, validates it and expands dead-letter retries.
    pub fn load(json: &str) -> Result<Config, AmqpError> {
        let config: Config = serde_json::from_str(json).map_err(|err| {
            error!(error = err.to_string(), "failure to parse the configuration");
            AmqpError::ConfigurationError(err.to_string())
        })?;

        config.prepare()
    }

    /// Reads and loads a JSON configuration file.
    pub async fn load_file(path: &Path) -> Result<Config, AmqpError> {
        debug!("reading configuration from {}", path.display());

        let json = tokio::fs::read_to_string(path).await.map_err(|err| {
            error!(error = err.to_string(), path = %path.display(), "failure to read the configuration");
            AmqpError::ConfigurationError(format!("{}: {}", path.display(), err))
        })?;

        Config::load(&json)
    }

    /// Validates a configuration built in code and expands dead-letter retries.
    pub fn prepare(self) -> Result<Config, AmqpError> {
        self.validate()?;
        dlx::expand(self)
    }

    /// Rejects values that must never reach the registries.
    pub fn validate(&self) -> Result<(), AmqpError> {
        for (name, conn) in &self.connections {
            if !(0.0..=MAX_HEARTBEAT_SECS).contains(&conn.heartbeat) {
                return Err(AmqpError::ConfigurationError(format!(
                    "connection `{name}` has a heartbeat `{}` outside 0..={MAX_HEARTBEAT_SECS}",
                    conn.heartbeat
                )));
            }

            if !(0.0..=MAX_TIMEOUT_SECS).contains(&conn.timeout) {
                return Err(AmqpError::ConfigurationError(format!(
                    "connection `{name}` has a timeout `{}` outside 0..={MAX_TIMEOUT_SECS}",
                    conn.timeout
                )));
            }
        }

        for (name, queue) in &self.queues {
            let Some(delays) = &queue.dlx else {
                continue;
            };

            let mut seen = BTreeSet::new();
            for delay in delays {
                if *delay <= 0 {
                    return Err(AmqpError::ConfigurationError(format!(
                        "queue `{name}` has a non-positive dlx delay `{delay}`"
                    )));
                }

                if delay.checked_mul(1000).is_none() {
                    return Err(AmqpError::ConfigurationError(format!(
                        "queue `{name}` has a dlx delay `{delay}` too large for a message ttl"
                    )));
                }

                if !seen.insert(*delay) {
                    return Err(AmqpError::ConfigurationError(format!(
                        "queue `{name}` repeats the dlx delay `{delay}`"
                    )));
                }
            }
        }

        for (name, producer) in &self.producers {
            if producer.exchange.is_none() && producer.queue.is_none() {
                return Err(AmqpError::ConfigurationError(format!(
                    "producer `{name}` needs an exchange or a queue"
                )));
            }
        }

        Ok(())
    }
}

/// Parses one retry delay written as a duration, e.g. `"30 seconds"` or `"1h 30m"`.
///
/// # Returns
/// The delay in whole seconds, or a message naming the rejected text
pub fn parse_delay(text: &str) -> Result<i64, String> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<i64>() {
        return Ok(seconds);
    }

    let delay = humantime::parse_duration(text)
        .map_err(|err| format!("invalid dlx delay `{text}`: {err}"))?;

    if delay.subsec_nanos() != 0 {
        return Err(format!(
            "dlx delay `{text}` is not a whole number of seconds"
        ));
    }

    i64::try_from(delay.as_secs()).map_err(|_| format!("dlx delay `{text}` is too large"))
}

fn retry_delays<'de, D>(deserializer: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Delay {
        Seconds(i64),
        Text(String),
    }

    let Some(delays) = Option::<Vec<Delay>>::deserialize(deserializer)? else {
        return Ok(None);
    };

    delays
        .into_iter()
        .map(|delay| match delay {
            Delay::Seconds(seconds) => Ok(seconds),
            Delay::Text(text) => parse_delay(&text).map_err(D::Error::custom),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Key {
        Text(String),
        Number(i64),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Key),
        Many(Vec<Key>),
    }

    let to_string = |key: Key| match key {
        Key::Text(v) => v,
        Key::Number(v) => v.to_string(),
    };

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(key) => vec![to_string(key)],
        OneOrMany::Many(keys) => keys.into_iter().map(to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_defaults_to_omitted_fields() {
        let config: Config = serde_json::from_str(
            r#"{
                "connections": { "default": { "host": "rabbit" } },
                "queues": { "orders": {} },
                "exchanges": { "events": { "type": "topic" } },
                "producers": { "orders": { "queue": "orders" } }
            }"#,
        )
        .unwrap();

        let conn = &config.connections["default"];
        assert_eq!(conn.host, "rabbit");
        assert_eq!(conn.port, 5672);
        assert_eq!(conn.vhost, "/");
        assert!(!conn.publish_confirm);

        let queue = &config.queues["orders"];
        assert_eq!(queue.connection, DEFAULT_CONNECTION);
        assert!(queue.durable);
        assert_eq!(queue.auto_create, AutoCreate::Lazy);
        assert_eq!(queue.dlx, None);

        assert_eq!(config.exchanges["events"].kind, ExchangeKind::Topic);

        let producer = &config.producers["orders"];
        assert_eq!(producer.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(producer.delivery_mode, DeliveryMode::Persistent);
    }

    #[test]
    fn parses_auto_create_flags_and_names() {
        let config: Config = serde_json::from_str(
            r#"{ "queues": {
                "a": { "autoCreate": true },
                "b": { "autoCreate": false },
                "c": { "autoCreate": "lazy" },
                "d": { "autoCreate": "eager" }
            } }"#,
        )
        .unwrap();

        assert_eq!(config.queues["a"].auto_create, AutoCreate::Eager);
        assert_eq!(config.queues["b"].auto_create, AutoCreate::None);
        assert_eq!(config.queues["c"].auto_create, AutoCreate::Lazy);
        assert_eq!(config.queues["d"].auto_create, AutoCreate::Eager);
    }

    #[test]
    fn rejects_unknown_exchange_kind() {
        let err = Config::load(r#"{ "exchanges": { "x": { "type": "random" } } }"#).unwrap_err();

        assert!(matches!(err, AmqpError::ConfigurationError(_)));
    }

    #[test]
    fn routing_key_accepts_single_value_or_list() {
        let config: Config = serde_json::from_str(
            r#"{ "exchanges": { "events": { "queueBindings": {
                "a": { "routingKey": "created" },
                "b": { "routingKey": ["created", 42] },
                "c": {}
            } } } }"#,
        )
        .unwrap();

        let bindings = &config.exchanges["events"].queue_bindings;
        assert_eq!(bindings["a"].routing_key, vec!["created"]);
        assert_eq!(bindings["b"].routing_key, vec!["created", "42"]);
        assert!(bindings["c"].routing_key.is_empty());
    }

    #[test]
    fn rejects_non_positive_dlx_delay_before_expansion() {
        let err = Config::load(r#"{ "queues": { "orders": { "dlx": [5, 0] } } }"#).unwrap_err();

        assert_eq!(
            err,
            AmqpError::ConfigurationError(
                "queue `orders` has a non-positive dlx delay `0`".to_owned()
            )
        );
    }

    #[test]
    fn rejects_repeated_dlx_delay() {
        let err = Config::load(r#"{ "queues": { "orders": { "dlx": [5, 5] } } }"#).unwrap_err();

        assert!(matches!(err, AmqpError::ConfigurationError(_)));
    }

    #[test]
    fn rejects_producer_without_target() {
        let err = Config::load(r#"{ "producers": { "lost": {} } }"#).unwrap_err();

        assert!(err.to_string().contains("lost"));
    }

    #[test]
    fn load_strips_dlx_field() {
        let config = Config::load(r#"{ "queues": { "orders": { "dlx": [5] } } }"#).unwrap();

        assert_eq!(config.queues["orders"].dlx, None);
        assert!(config.queues.contains_key("orders.dlx-5"));
    }

    #[test]
    fn heartbeat_interval_has_a_floor_of_one_second() {
        let mut conn = ConnectionConfig::default();
        conn.heartbeat = 0.2;
        assert_eq!(conn.heartbeat_interval(), Duration::from_secs(1));

        conn.heartbeat = 3.0;
        conn.timeout = 7.0;
        assert_eq!(conn.heartbeat_interval(), Duration::from_secs(3));
        assert_eq!(conn.read_write_timeout(), Duration::from_secs(14));
    }

    #[test]
    fn dlx_accepts_duration_strings() {
        let config = Config::load(
            r#"{ "queues": { "orders": { "dlx": ["30 seconds", "5 minutes", "1h 30m", 7] } } }"#,
        )
        .unwrap();

        for name in ["orders.dlx-30", "orders.dlx-300", "orders.dlx-5400", "orders.dlx-7"] {
            assert!(config.queues.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn parses_delays_in_whole_seconds() {
        assert_eq!(parse_delay("45"), Ok(45));
        assert_eq!(parse_delay(" 2 minutes "), Ok(120));
        assert!(parse_delay("1500ms").is_err());
        assert!(parse_delay("soon").unwrap_err().contains("soon"));
    }

    #[test]
    fn rejects_unparsable_dlx_delay() {
        let err = Config::load(r#"{ "queues": { "orders": { "dlx": ["whenever"] } } }"#)
            .unwrap_err();

        assert!(matches!(err, AmqpError::ConfigurationError(_)));
        assert!(err.to_string().contains("whenever"));
    }

    #[test]
    fn sub_second_duration_is_a_non_positive_delay() {
        let err = Config::load(r#"{ "queues": { "orders": { "dlx": ["0s"] } } }"#).unwrap_err();

        assert!(err.to_string().contains("non-positive"));
    }

    #[test]
    fn rejects_dlx_delay_overflowing_the_ttl() {
        let err = Config::load(r#"{ "queues": { "orders": { "dlx": [9223372036854776] } } }"#)
            .unwrap_err();

        assert!(matches!(err, AmqpError::ConfigurationError(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn rejects_out_of_range_heartbeat_and_timeout() {
        let err = Config::load(r#"{ "connections": { "main": { "heartbeat": 1e20 } } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("heartbeat"));

        let err = Config::load(r#"{ "connections": { "main": { "timeout": -1 } } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn unbounded_durations_saturate_instead_of_panicking() {
        let conn = ConnectionConfig {
            heartbeat: f64::INFINITY,
            ..ConnectionConfig::default()
        };

        assert_eq!(conn.heartbeat_interval(), Duration::MAX);
        assert_eq!(conn.read_write_timeout(), Duration::MAX);
    }

    #[test]
    fn nested_arguments_become_field_tables() {
        let mut death = BTreeMap::new();
        death.insert("count".to_owned(), ArgumentValue::Int(2));

        let value = ArgumentValue::Table(death).to_amqp();
        let AMQPValue::FieldTable(table) = value else {
            panic!("expected a field table");
        };
        assert_eq!(
            table.inner().get("count"),
            Some(&AMQPValue::LongLongInt(2))
        );
    }
}
