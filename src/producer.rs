// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Producer
//!
//! This module provides the runtime [`Producer`] and its memoizing
//! [`ProducerFactory`]. A producer publishes to its queue through the default
//! exchange, to its exchange with the message routing key, or to both. Lazily
//! created targets are declared once right before the first publish, and the
//! current OpenTelemetry context travels in the message headers.

use crate::{
    cache::{Callbacks, CreatedCallback, Memo},
    config::{ArgumentValue, ProducerConfig},
    connection::Connection,
    errors::AmqpError,
    exchange::{Exchange, ExchangeFactory},
    otel,
    queue::{Queue, QueueFactory},
    registry::ProducersDataBag,
    topology::LazyDeclarator,
};
use lapin::{
    types::{AMQPValue, FieldTable, ShortString},
    BasicProperties,
};
use opentelemetry::Context;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// The nameless default exchange routes on the queue name.
const DEFAULT_EXCHANGE: &str = "";

/// A message handed to [`Producer::publish`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishMessage {
    pub data: Vec<u8>,
    pub routing_key: String,
    pub msg_type: Option<String>,
    pub headers: BTreeMap<String, ArgumentValue>,
}

impl PublishMessage {
    /// Creates a message with the given body, no routing key and no headers.
    ///
    /// # Parameters
    /// * `data` - The message body
    pub fn new(data: impl Into<Vec<u8>>) -> PublishMessage {
        PublishMessage {
            data: data.into(),
            ..PublishMessage::default()
        }
    }

    /// Sets the routing key used when publishing to an exchange.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Sets the `type` property of the message.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn msg_type(mut self, kind: &str) -> Self {
        self.msg_type = Some(kind.to_owned());
        self
    }

    /// Adds an application header, replacing any previous value under `key`.
    ///
    /// # Parameters
    /// * `key` - Header name
    /// * `value` - Scalar, list or table value
    ///
    /// # Returns
    /// Self for method chaining
    pub fn header(mut self, key: &str, value: impl Into<ArgumentValue>) -> Self {
        self.headers.insert(key.to_owned(), value.into());
        self
    }
}

/// Publishes messages to a configured queue and/or exchange.
pub struct Producer {
    name: String,
    config: ProducerConfig,
    queue: Option<Arc<Queue>>,
    exchange: Option<Arc<Exchange>>,
    declarator: Arc<LazyDeclarator>,
}

impl Producer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the producer record, with its content type and delivery mode.
    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// Returns the queue target, published through the default exchange.
    pub fn queue(&self) -> Option<&Arc<Queue>> {
        self.queue.as_ref()
    }

    /// Returns the exchange target, published with the message routing key.
    pub fn exchange(&self) -> Option<&Arc<Exchange>> {
        self.exchange.as_ref()
    }

    /// Publishes `message` carrying the current OpenTelemetry context.
    pub async fn publish(&self, message: &PublishMessage) -> Result<(), AmqpError> {
        self.publish_with_context(&Context::current(), message).await
    }

    /// Publishes `message` carrying `ctx` in its headers.
    ///
    /// The queue target is published first, through the default exchange with the
    /// queue name as routing key; the exchange target uses the message routing key.
    /// On a publish-confirm connection a broker nack fails the publish.
    ///
    /// # Returns
    /// Ok(()) on success, the declaration error of a lazy target, or
    /// [`AmqpError::PublishingError`] when the broker call fails
    pub async fn publish_with_context(
        &self,
        ctx: &Context,
        message: &PublishMessage,
    ) -> Result<(), AmqpError> {
        let properties = self.properties(ctx, message);

        if let Some(queue) = &self.queue {
            self.declarator.declare_queue(queue).await?;
            self.send(
                queue.connection(),
                DEFAULT_EXCHANGE,
                queue.name(),
                &message.data,
                properties.clone(),
            )
            .await?;
        }

        if let Some(exchange) = &self.exchange {
            self.declarator.declare_exchange(exchange).await?;
            self.send(
                exchange.connection(),
                exchange.name(),
                &message.routing_key,
                &message.data,
                properties,
            )
            .await?;
        }

        Ok(())
    }

    fn properties(&self, ctx: &Context, message: &PublishMessage) -> BasicProperties {
        let mut headers = BTreeMap::<ShortString, AMQPValue>::default();
        otel::inject_context(ctx, &mut headers);

        for (key, value) in &message.headers {
            headers.insert(ShortString::from(key.as_str()), value.to_amqp());
        }

        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(self.config.content_type.as_str()))
            .with_delivery_mode(self.config.delivery_mode.as_u8())
            .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
            .with_headers(FieldTable::from(headers));

        match &message.msg_type {
            Some(kind) => properties.with_type(ShortString::from(kind.as_str())),
            None => properties,
        }
    }

    async fn send(
        &self,
        connection: &Connection,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        let channel = connection.channel().await?;

        match channel
            .basic_publish(exchange, routing_key, payload, properties)
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    producer = self.name.as_str(),
                    "error publishing message"
                );
                if err.is_stale_connection() {
                    warn!(
                        connection = connection.name(),
                        "dropping the channel of a stale connection"
                    );
                    connection.reset_channel().await;
                }
                Err(AmqpError::PublishingError(self.name.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Builds and memoizes [`Producer`]s by name.
pub struct ProducerFactory {
    data_bag: Arc<ProducersDataBag>,
    queue_factory: Arc<QueueFactory>,
    exchange_factory: Arc<ExchangeFactory>,
    declarator: Arc<LazyDeclarator>,
    producers: Memo<Producer>,
    callbacks: Callbacks<Producer>,
}

impl ProducerFactory {
    /// Creates a factory resolving producers from `data_bag`.
    ///
    /// # Parameters
    /// * `data_bag` - Producer records by name
    /// * `queue_factory` - Resolves queue targets
    /// * `exchange_factory` - Resolves exchange targets
    /// * `declarator` - Declares lazy targets before the first publish
    pub fn new(
        data_bag: Arc<ProducersDataBag>,
        queue_factory: Arc<QueueFactory>,
        exchange_factory: Arc<ExchangeFactory>,
        declarator: Arc<LazyDeclarator>,
    ) -> ProducerFactory {
        ProducerFactory {
            data_bag,
            queue_factory,
            exchange_factory,
            declarator,
            producers: Memo::new(),
            callbacks: Callbacks::new(),
        }
    }

    /// Returns the registry the factory looks producers up in.
    pub fn data_bag(&self) -> &ProducersDataBag {
        &self.data_bag
    }

    /// Returns the producer registered under `name`, building it on first use.
    ///
    /// # Returns
    /// The shared producer, or [`AmqpError::FactoryError`] naming `name` when the
    /// producer or one of its targets cannot be resolved
    pub async fn get_producer(&self, name: &str) -> Result<Arc<Producer>, AmqpError> {
        self.producers
            .get_or_try_init(name, || self.create(name))
            .await
            .map_err(|err| AmqpError::factory("producer", name, err))
    }

    /// Registers an observer called once for every producer this factory builds.
    pub fn add_on_created_callback(&self, callback: CreatedCallback<Producer>) {
        self.callbacks.add(callback);
    }

    async fn create(&self, name: &str) -> Result<Arc<Producer>, AmqpError> {
        let config = self.data_bag.get_data_by_key(name)?.clone();

        let queue = match &config.queue {
            Some(queue) => Some(self.queue_factory.get_queue(queue).await?),
            None => None,
        };
        let exchange = match &config.exchange {
            Some(exchange) => Some(self.exchange_factory.get_exchange(exchange).await?),
            None => None,
        };

        if queue.is_none() && exchange.is_none() {
            return Err(AmqpError::ConfigurationError(format!(
                "producer `{name}` has neither an exchange nor a queue"
            )));
        }

        debug!("producer: {} was resolved", name);
        let producer = Arc::new(Producer {
            name: name.to_owned(),
            config,
            queue,
            exchange,
            declarator: self.declarator.clone(),
        });
        self.callbacks.notify(name, &producer);

        Ok(producer)
    }
}
