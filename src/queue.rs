// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Runtime Objects
//!
//! This module provides the runtime [`Queue`] and the memoizing [`QueueFactory`]
//! that builds one per configured name. Building a queue resolves its connection
//! and, when the queue is declared eagerly, issues the broker declaration before
//! the queue is handed out.

use crate::{
    cache::{Callbacks, CreatedCallback, Memo},
    config::{AutoCreate, QueueConfig},
    connection::{Connection, ConnectionFactory},
    errors::AmqpError,
    registry::QueuesDataBag,
    topology::TopologyDeclarator,
};
use std::sync::Arc;
use tracing::debug;

/// A configured queue bound to its resolved connection.
pub struct Queue {
    name: String,
    config: QueueConfig,
    connection: Arc<Connection>,
}

impl Queue {
    /// Returns the name the queue is registered and declared under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configuration record the queue was built from, with its
    /// arguments already merged.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the shared connection of the queue.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Returns when the queue is declared on the broker.
    pub fn auto_create(&self) -> AutoCreate {
        self.config.auto_create
    }
}

/// Builds and memoizes [`Queue`]s by name.
pub struct QueueFactory {
    data_bag: Arc<QueuesDataBag>,
    connections: Arc<ConnectionFactory>,
    declarator: Arc<TopologyDeclarator>,
    queues: Memo<Queue>,
    callbacks: Callbacks<Queue>,
}

impl QueueFactory {
    /// Creates a factory resolving queues from `data_bag`.
    ///
    /// # Parameters
    /// * `data_bag` - Queue records by name
    /// * `connections` - Connection manager queues are resolved against
    /// * `declarator` - Issues the declaration of eager queues
    pub fn new(
        data_bag: Arc<QueuesDataBag>,
        connections: Arc<ConnectionFactory>,
        declarator: Arc<TopologyDeclarator>,
    ) -> QueueFactory {
        QueueFactory {
            data_bag,
            connections,
            declarator,
            queues: Memo::new(),
            callbacks: Callbacks::new(),
        }
    }

    /// Returns the registry the factory looks queues up in.
    pub fn data_bag(&self) -> &QueuesDataBag {
        &self.data_bag
    }

    /// Returns the queue registered under `name`, building it on first use.
    ///
    /// # Returns
    /// The shared queue, or [`AmqpError::FactoryError`] naming `name` when the queue
    /// or its connection is unknown, or an eager declaration failed
    pub async fn get_queue(&self, name: &str) -> Result<Arc<Queue>, AmqpError> {
        self.queues
            .get_or_try_init(name, || self.create(name))
            .await
            .map_err(|err| AmqpError::factory("queue", name, err))
    }

    /// Registers an observer called once for every queue this factory builds.
    pub fn add_on_created_callback(&self, callback: CreatedCallback<Queue>) {
        self.callbacks.add(callback);
    }

    async fn create(&self, name: &str) -> Result<Arc<Queue>, AmqpError> {
        let config = self.data_bag.get_data_by_key(name)?.clone();
        let connection = self.connections.get_connection(&config.connection).await?;

        if config.auto_create == AutoCreate::Eager {
            self.declarator.declare_queue(name).await?;
        }

        debug!("queue: {} was resolved", name);
        let queue = Arc::new(Queue {
            name: name.to_owned(),
            config,
            connection,
        });
        self.callbacks.notify(name, &queue);

        Ok(queue)
    }
}
