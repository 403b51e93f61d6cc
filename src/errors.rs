// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Topology Layer
//!
//! This module provides the error taxonomy shared by the registries, factories,
//! declarators and the connection manager. Registry misses surface as
//! [`AmqpError::NotFound`] and are always wrapped into an
//! [`AmqpError::FactoryError`] by the factory that asked for the name.

use thiserror::Error;

/// Represents errors that can occur while resolving or declaring AMQP topology.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// A registry lookup for a name that was never registered
    #[error("`{name}` does not exist, available: [{}]", .available.join(", "))]
    NotFound { name: String, available: Vec<String> },

    /// A named runtime object could not be built
    #[error("failure to create {kind} `{name}`: {source}")]
    FactoryError {
        kind: &'static str,
        name: String,
        source: Box<AmqpError>,
    },

    /// Fatal transport failure, carrying the transport's message and code
    #[error("failure to connect: {message} (code {code})")]
    ConnectionError { message: String, code: u16 },

    /// Invalid configuration detected before the registries were built
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),

    /// Error switching a fresh channel into publisher confirm mode
    #[error("failure to enable publisher confirms on connection `{0}`")]
    ConfirmSelectError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding an exchange to a queue
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error publishing a message through the named producer
    #[error("failure to publish with producer `{0}`")]
    PublishingError(String),
}

impl AmqpError {
    pub(crate) fn factory(kind: &'static str, name: &str, source: AmqpError) -> Self {
        AmqpError::FactoryError {
            kind,
            name: name.to_owned(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_available_names() {
        let err = AmqpError::NotFound {
            name: "missing".to_owned(),
            available: vec!["orders".to_owned(), "payments".to_owned()],
        };

        assert_eq!(
            err.to_string(),
            "`missing` does not exist, available: [orders, payments]"
        );
    }

    #[test]
    fn factory_error_carries_nested_message() {
        let err = AmqpError::factory(
            "exchange",
            "events",
            AmqpError::factory(
                "queue",
                "ghost",
                AmqpError::NotFound {
                    name: "ghost".to_owned(),
                    available: vec![],
                },
            ),
        );

        let msg = err.to_string();
        assert!(msg.contains("exchange `events`"));
        assert!(msg.contains("queue `ghost`"));
    }
}
