// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management for RabbitMQ
//!
//! This module provides the exchange kinds, the runtime [`Exchange`] with its
//! resolved queue bindings, and the memoizing [`ExchangeFactory`]. Exchanges are
//! the routing mechanism in RabbitMQ that determine how messages are distributed
//! to queues; building one resolves every bound queue through the
//! [`QueueFactory`].

use crate::{
    cache::{Callbacks, CreatedCallback, Memo},
    config::{ArgumentValue, AutoCreate, ExchangeConfig},
    connection::{Connection, ConnectionFactory},
    errors::AmqpError,
    queue::{Queue, QueueFactory},
    registry::ExchangesDataBag,
    topology::TopologyDeclarator,
};
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

/// Constant for the argument used to specify the delayed exchange type
pub const AMQP_HEADERS_DELAYED_EXCHANGE_TYPE: &str = "x-delayed-type";

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    #[serde(rename = "x-delayed-message", alias = "delayed")]
    XMessageDelayed,
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    /// Converts the internal ExchangeKind to lapin's ExchangeKind.
    ///
    /// The delayed kind maps onto the custom exchange type provided by the
    /// delayed message exchange plugin.
    fn from(kind: &ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom("x-delayed-message".to_owned())
            }
        }
    }
}

/// A binding of an exchange to a resolved queue.
pub struct QueueBinding {
    queue: Arc<Queue>,
    routing_keys: Vec<String>,
    arguments: BTreeMap<String, ArgumentValue>,
    no_wait: bool,
}

impl QueueBinding {
    /// The bound queue, built by the queue factory.
    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Routing keys of the binding; empty means a single bind with the empty key.
    pub fn routing_keys(&self) -> &[String] {
        &self.routing_keys
    }

    /// Binding arguments, passed to every bind of this queue.
    pub fn arguments(&self) -> &BTreeMap<String, ArgumentValue> {
        &self.arguments
    }

    pub fn no_wait(&self) -> bool {
        self.no_wait
    }
}

/// A configured exchange with its connection and bound queues resolved.
pub struct Exchange {
    name: String,
    config: ExchangeConfig,
    queue_bindings: Vec<QueueBinding>,
    connection: Arc<Connection>,
}

impl Exchange {
    /// Returns the name the exchange is registered and declared under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration record the exchange was built from.
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn kind(&self) -> &ExchangeKind {
        &self.config.kind
    }

    /// Returns the bindings in queue name order, each with its queue resolved.
    pub fn queue_bindings(&self) -> &[QueueBinding] {
        &self.queue_bindings
    }

    /// Returns the connection the exchange is declared and published on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Returns when the exchange is declared on the broker.
    pub fn auto_create(&self) -> AutoCreate {
        self.config.auto_create
    }
}

/// Builds and memoizes [`Exchange`]s by name.
pub struct ExchangeFactory {
    data_bag: Arc<ExchangesDataBag>,
    queue_factory: Arc<QueueFactory>,
    connections: Arc<ConnectionFactory>,
    declarator: Arc<TopologyDeclarator>,
    exchanges: Memo<Exchange>,
    callbacks: Callbacks<Exchange>,
}

impl ExchangeFactory {
    /// Creates a factory resolving exchanges from `data_bag`.
    ///
    /// # Parameters
    /// * `data_bag` - Exchange records by name
    /// * `queue_factory` - Resolves the bound queues
    /// * `connections` - Connection manager exchanges are resolved against
    /// * `declarator` - Issues the declaration of eager exchanges
    pub fn new(
        data_bag: Arc<ExchangesDataBag>,
        queue_factory: Arc<QueueFactory>,
        connections: Arc<ConnectionFactory>,
        declarator: Arc<TopologyDeclarator>,
    ) -> ExchangeFactory {
        ExchangeFactory {
            data_bag,
            queue_factory,
            connections,
            declarator,
            exchanges: Memo::new(),
            callbacks: Callbacks::new(),
        }
    }

    pub fn data_bag(&self) -> &ExchangesDataBag {
        &self.data_bag
    }

    /// Returns the exchange registered under `name`, building it on first use.
    ///
    /// Every bound queue is resolved through the queue factory, so a binding to an
    /// unknown queue fails the exchange with a [`AmqpError::FactoryError`] naming
    /// both.
    pub async fn get_exchange(&self, name: &str) -> Result<Arc<Exchange>, AmqpError> {
        self.exchanges
            .get_or_try_init(name, || self.create(name))
            .await
            .map_err(|err| AmqpError::factory("exchange", name, err))
    }

    /// Registers an observer called once for every exchange this factory builds.
    pub fn add_on_created_callback(&self, callback: CreatedCallback<Exchange>) {
        self.callbacks.add(callback);
    }

    async fn create(&self, name: &str) -> Result<Arc<Exchange>, AmqpError> {
        let config = self.data_bag.get_data_by_key(name)?.clone();
        let connection = self.connections.get_connection(&config.connection).await?;

        let mut queue_bindings = Vec::with_capacity(config.queue_bindings.len());
        for (queue_name, binding) in &config.queue_bindings {
            let queue = self.queue_factory.get_queue(queue_name).await?;

            queue_bindings.push(QueueBinding {
                queue,
                routing_keys: binding.routing_key.clone(),
                arguments: binding.arguments.clone(),
                no_wait: binding.no_wait,
            });
        }

        if config.auto_create == AutoCreate::Eager {
            self.declarator.declare_exchange(name).await?;
        }

        debug!("exchange: {} was resolved", name);
        let exchange = Arc::new(Exchange {
            name: name.to_owned(),
            config,
            queue_bindings,
            connection,
        });
        self.callbacks.notify(name, &exchange);

        Ok(exchange)
    }
}
