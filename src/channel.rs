// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Boundary
//!
//! This module defines the subset of channel operations the topology layer needs:
//! declaring exchanges and queues, binding them, publishing and enabling publisher
//! confirms. The [`AmqpChannel`] trait is implemented for lapin's `Channel`; the
//! connection manager hands out `Arc<dyn AmqpChannel>` so the rest of the crate
//! never depends on a live broker.

use crate::transport::TransportError;
use async_trait::async_trait;
use lapin::{
    options::{
        BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, ExchangeKind,
};
#[cfg(test)]
use mockall::automock;
use tracing::error;

/// Channel operations issued by the declarators and producers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    /// Puts the channel into publisher confirm mode.
    async fn confirm_select(&self) -> Result<(), TransportError>;

    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError>;

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError>;

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        options: QueueBindOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError>;

    /// Publishes a message and waits for the broker confirmation when the channel
    /// is in confirm mode.
    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), TransportError>;
}

#[async_trait]
impl AmqpChannel for Channel {
    async fn confirm_select(&self) -> Result<(), TransportError> {
        Channel::confirm_select(self, ConfirmSelectOptions::default())
            .await
            .map_err(TransportError::from)
    }

    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError> {
        Channel::exchange_declare(self, name, kind, options, arguments)
            .await
            .map_err(TransportError::from)
    }

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError> {
        Channel::queue_declare(self, name, options, arguments)
            .await
            .map(|_| ())
            .map_err(TransportError::from)
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        options: QueueBindOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError> {
        Channel::queue_bind(self, queue, exchange, routing_key, options, arguments)
            .await
            .map_err(TransportError::from)
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), TransportError> {
        let confirm = Channel::basic_publish(
            self,
            exchange,
            routing_key,
            BasicPublishOptions {
                immediate: false,
                mandatory: false,
            },
            payload,
            properties,
        )
        .await?;

        let confirmation = confirm.await?;
        if confirmation.is_nack() {
            error!(exchange = exchange, routing_key = routing_key, "message was nacked");
            return Err(TransportError::new("message was nacked by the broker", 0));
        }

        Ok(())
    }
}
