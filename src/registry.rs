// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Named Registries
//!
//! Immutable name-indexed storage of validated configuration records. A registry is
//! built once from an already expanded [`Config`] and handed to the factories by
//! reference; there is no process-wide registry.

use crate::{
    config::{Config, ConnectionConfig, ExchangeConfig, ProducerConfig, QueueConfig},
    errors::AmqpError,
};
use std::collections::BTreeMap;

/// A registry of configuration records keyed by logical name.
#[derive(Debug, Clone, Default)]
pub struct DataBag<T> {
    data: BTreeMap<String, T>,
}

pub type ConnectionsDataBag = DataBag<ConnectionConfig>;
pub type QueuesDataBag = DataBag<QueueConfig>;
pub type ExchangesDataBag = DataBag<ExchangeConfig>;
pub type ProducersDataBag = DataBag<ProducerConfig>;

impl<T> DataBag<T> {
    /// Wraps already validated records.
    ///
    /// # Parameters
    /// * `data` - Records keyed by logical name
    pub fn new(data: BTreeMap<String, T>) -> DataBag<T> {
        DataBag { data }
    }

    /// Looks up the record registered under `key`.
    ///
    /// # Returns
    /// The record, or [`AmqpError::NotFound`] listing every registered name
    pub fn get_data_by_key(&self, key: &str) -> Result<&T, AmqpError> {
        self.data.get(key).ok_or_else(|| AmqpError::NotFound {
            name: key.to_owned(),
            available: self.get_data_keys(),
        })
    }

    /// Registered names, sorted.
    pub fn get_data_keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// Iterates over the records in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.data.iter().map(|(name, data)| (name.as_str(), data))
    }

    /// Returns the number of registered records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// All four registries of one configuration.
#[derive(Debug, Clone, Default)]
pub struct Registries {
    pub connections: ConnectionsDataBag,
    pub queues: QueuesDataBag,
    pub exchanges: ExchangesDataBag,
    pub producers: ProducersDataBag,
}

impl From<Config> for Registries {
    fn from(config: Config) -> Self {
        Registries {
            connections: DataBag::new(config.connections),
            queues: DataBag::new(config.queues),
            exchanges: DataBag::new(config.exchanges),
            producers: DataBag::new(config.producers),
        }
    }
}
