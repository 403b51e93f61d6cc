// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Client
//!
//! Wires a configuration into registries, the connection manager, the declarators
//! and the three resource factories. Building a [`Client`] performs no network
//! call; [`Client::declare_eager_topology`] instantiates every eagerly created
//! queue and exchange, which is what a host runs at startup.

use crate::{
    config::{AutoCreate, Config},
    connection::ConnectionFactory,
    errors::AmqpError,
    exchange::ExchangeFactory,
    producer::{Producer, ProducerFactory},
    queue::QueueFactory,
    registry::Registries,
    topology::{LazyDeclarator, TopologyDeclarator},
    transport::{LapinTransportFactory, TransportFactory},
};
use std::sync::Arc;
use tracing::debug;

pub struct Client {
    connections: Arc<ConnectionFactory>,
    queues: Arc<QueueFactory>,
    exchanges: Arc<ExchangeFactory>,
    producers: ProducerFactory,
    declarator: Arc<TopologyDeclarator>,
}

impl Client {
    /// Validates and expands `config`, then builds the registries and factories.
    ///
    /// # Parameters
    /// * `config` - The topology configuration, expanded or not
    /// * `transports` - Creates the transport of every connection
    ///
    /// # Returns
    /// The client, or [`AmqpError::ConfigurationError`] for an invalid configuration
    pub fn new(config: Config, transports: Arc<dyn TransportFactory>) -> Result<Client, AmqpError> {
        let registries = Registries::from(config.prepare()?);

        let connections = Arc::new(ConnectionFactory::new(
            Arc::new(registries.connections),
            transports,
        ));
        let queues_bag = Arc::new(registries.queues);
        let exchanges_bag = Arc::new(registries.exchanges);

        let declarator = Arc::new(TopologyDeclarator::new(
            queues_bag.clone(),
            exchanges_bag.clone(),
            connections.clone(),
        ));
        let queues = Arc::new(QueueFactory::new(
            queues_bag,
            connections.clone(),
            declarator.clone(),
        ));
        let exchanges = Arc::new(ExchangeFactory::new(
            exchanges_bag,
            queues.clone(),
            connections.clone(),
            declarator.clone(),
        ));
        let producers = ProducerFactory::new(
            Arc::new(registries.producers),
            queues.clone(),
            exchanges.clone(),
            Arc::new(LazyDeclarator::new(declarator.clone())),
        );

        Ok(Client {
            connections,
            queues,
            exchanges,
            producers,
            declarator,
        })
    }

    /// Builds a client whose connections run over lapin.
    pub fn with_lapin(config: Config) -> Result<Client, AmqpError> {
        Client::new(config, Arc::new(LapinTransportFactory))
    }

    /// Returns the producer registered under `name`, building it on first use.
    pub async fn get_producer(&self, name: &str) -> Result<Arc<Producer>, AmqpError> {
        self.producers.get_producer(name).await
    }

    /// Returns the connection manager, for heartbeats and resets.
    pub fn connections(&self) -> &Arc<ConnectionFactory> {
        &self.connections
    }

    pub fn queues(&self) -> &Arc<QueueFactory> {
        &self.queues
    }

    pub fn exchanges(&self) -> &Arc<ExchangeFactory> {
        &self.exchanges
    }

    pub fn producers(&self) -> &ProducerFactory {
        &self.producers
    }

    /// Instantiates every eager queue and exchange, declaring them on the broker.
    pub async fn declare_eager_topology(&self) -> Result<(), AmqpError> {
        for (name, config) in self.queues.data_bag().iter() {
            if config.auto_create == AutoCreate::Eager {
                self.queues.get_queue(name).await?;
            }
        }

        for (name, config) in self.exchanges.data_bag().iter() {
            if config.auto_create == AutoCreate::Eager {
                self.exchanges.get_exchange(name).await?;
            }
        }

        debug!("eager topology declared");
        Ok(())
    }

    /// Declares every queue and exchange whose policy is not `none`.
    pub async fn declare_queues_and_exchanges(&self) -> Result<(), AmqpError> {
        self.declarator.declare_queues_and_exchanges().await
    }
}
