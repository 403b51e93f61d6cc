// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module issues the broker declarations for the configured topology.
//! [`TopologyDeclarator`] declares queues, exchanges and the bindings between them
//! straight from the registries, while [`LazyDeclarator`] remembers which lazily
//! created resources were already declared so a producer declares them only once.
//!
//! The header constants used by queue arguments and the dead-letter retry
//! expansion live here as well.

use crate::{
    config::{field_table, ArgumentValue, AutoCreate, QueueConfig},
    connection::ConnectionFactory,
    errors::AmqpError,
    exchange::{Exchange, ExchangeKind, AMQP_HEADERS_DELAYED_EXCHANGE_TYPE},
    queue::Queue,
    registry::{ExchangesDataBag, QueuesDataBag},
};
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use std::{collections::HashSet, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Constant for the header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the header field used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the header field used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";
/// Constant for the binding argument selecting how headers are matched
pub const AMQP_HEADERS_MATCH: &str = "x-match";
/// Constant for the header the broker records dead-lettering history in
pub const AMQP_HEADERS_X_DEATH: &str = "x-death";

/// Declares queues, exchanges and bindings described by the registries.
///
/// A queue declared once is not declared again as the bound queue of an exchange.
pub struct TopologyDeclarator {
    queues: Arc<QueuesDataBag>,
    exchanges: Arc<ExchangesDataBag>,
    connections: Arc<ConnectionFactory>,
    declared_queues: Mutex<HashSet<String>>,
}

impl TopologyDeclarator {
    pub fn new(
        queues: Arc<QueuesDataBag>,
        exchanges: Arc<ExchangesDataBag>,
        connections: Arc<ConnectionFactory>,
    ) -> TopologyDeclarator {
        TopologyDeclarator {
            queues,
            exchanges,
            connections,
            declared_queues: Mutex::new(HashSet::new()),
        }
    }

    /// Declares the queue registered under `name`.
    ///
    /// A queue whose policy is [`AutoCreate::None`] is never declared.
    ///
    /// # Returns
    /// Ok(()) on success, [`AmqpError::NotFound`] for an unknown name or
    /// [`AmqpError::DeclareQueueError`] when the broker refuses the declaration
    pub async fn declare_queue(&self, name: &str) -> Result<(), AmqpError> {
        let config = self.queues.get_data_by_key(name)?;
        if config.auto_create == AutoCreate::None {
            return Ok(());
        }

        self.queue_declare(name, config).await?;
        self.declared_queues.lock().await.insert(name.to_owned());
        Ok(())
    }

    /// Declares the exchange registered under `name` together with its bindings.
    ///
    /// This method performs the following operations in order:
    /// 1. Declares every bound queue whose policy allows it and that this
    ///    declarator has not declared yet
    /// 2. Declares the exchange
    /// 3. Binds each queue once per routing key, or once with the empty key
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn declare_exchange(&self, name: &str) -> Result<(), AmqpError> {
        let config = self.exchanges.get_data_by_key(name)?;
        if config.auto_create == AutoCreate::None {
            return Ok(());
        }

        for queue_name in config.queue_bindings.keys() {
            if self.declared_queues.lock().await.contains(queue_name) {
                continue;
            }
            self.declare_queue(queue_name).await?;
        }

        let channel = self.connections.get_channel(&config.connection).await?;

        let mut arguments = config.arguments.clone();
        if config.kind == ExchangeKind::XMessageDelayed {
            arguments
                .entry(AMQP_HEADERS_DELAYED_EXCHANGE_TYPE.to_owned())
                .or_insert_with(|| ArgumentValue::from("direct"));
        }

        debug!("creating exchange: {}", name);
        channel
            .exchange_declare(
                name,
                lapin::ExchangeKind::from(&config.kind),
                ExchangeDeclareOptions {
                    passive: config.passive,
                    durable: config.durable,
                    auto_delete: config.auto_delete,
                    internal: config.internal,
                    nowait: config.no_wait,
                },
                field_table(&arguments),
            )
            .await
            .map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = name,
                    "error to declare the exchange"
                );
                AmqpError::DeclareExchangeError(name.to_owned())
            })?;

        for (queue_name, binding) in &config.queue_bindings {
            let empty = [String::new()];
            let routing_keys = if binding.routing_key.is_empty() {
                &empty[..]
            } else {
                &binding.routing_key[..]
            };

            for routing_key in routing_keys {
                debug!(
                    "binding queue: {} to the exchange: {} with the key: {}",
                    queue_name, name, routing_key
                );

                channel
                    .queue_bind(
                        queue_name,
                        name,
                        routing_key,
                        QueueBindOptions {
                            nowait: binding.no_wait,
                        },
                        field_table(&binding.arguments),
                    )
                    .await
                    .map_err(|err| {
                        error!(error = err.to_string(), "error to bind queue to exchange");
                        AmqpError::BindingExchangeToQueueError(
                            name.to_owned(),
                            queue_name.to_owned(),
                        )
                    })?;
            }
        }

        debug!("exchange: {} was created", name);
        Ok(())
    }

    /// Declares every registered queue and exchange whose policy is not
    /// [`AutoCreate::None`], queues first.
    pub async fn declare_queues_and_exchanges(&self) -> Result<(), AmqpError> {
        for (name, _) in self.queues.iter() {
            self.declare_queue(name).await?;
        }

        for (name, _) in self.exchanges.iter() {
            self.declare_exchange(name).await?;
        }

        Ok(())
    }

    async fn queue_declare(&self, name: &str, config: &QueueConfig) -> Result<(), AmqpError> {
        let channel = self.connections.get_channel(&config.connection).await?;

        debug!("creating queue: {}", name);
        match channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    passive: config.passive,
                    durable: config.durable,
                    exclusive: config.exclusive,
                    auto_delete: config.auto_delete,
                    nowait: config.no_wait,
                },
                field_table(&config.arguments),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = name,
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(name.to_owned()))
            }
            _ => {
                debug!("queue: {} was created", name);
                Ok(())
            }
        }
    }
}

/// Declares lazily created resources once, right before their first use.
pub struct LazyDeclarator {
    declarator: Arc<TopologyDeclarator>,
    queues: Mutex<HashSet<String>>,
    exchanges: Mutex<HashSet<String>>,
}

impl LazyDeclarator {
    pub fn new(declarator: Arc<TopologyDeclarator>) -> LazyDeclarator {
        LazyDeclarator {
            declarator,
            queues: Mutex::new(HashSet::new()),
            exchanges: Mutex::new(HashSet::new()),
        }
    }

    pub async fn declare_queue(&self, queue: &Queue) -> Result<(), AmqpError> {
        if queue.auto_create() != AutoCreate::Lazy {
            return Ok(());
        }

        let mut declared = self.queues.lock().await;
        if declared.contains(queue.name()) {
            return Ok(());
        }

        self.declarator.declare_queue(queue.name()).await?;
        declared.insert(queue.name().to_owned());
        Ok(())
    }

    pub async fn declare_exchange(&self, exchange: &Exchange) -> Result<(), AmqpError> {
        if exchange.auto_create() != AutoCreate::Lazy {
            return Ok(());
        }

        let mut declared = self.exchanges.lock().await;
        if declared.contains(exchange.name()) {
            return Ok(());
        }

        self.declarator.declare_exchange(exchange.name()).await?;
        declared.insert(exchange.name().to_owned());
        Ok(())
    }
}
