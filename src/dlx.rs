// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Dead Letter Retry Expansion
//!
//! Rewrites every queue carrying retry delays into a delayed-retry topology built on
//! RabbitMQ dead-lettering. For a queue `Q` with delays `[d0, .., dn-1]`:
//!
//! - `Q.dlx-retry`: fanout exchange bound to `Q`, returns retried messages to it
//! - `Q.dlx-wait`: headers exchange routing a dead-lettered message to the wait
//!   queue matching its death count
//! - `Q.dlx-<d>`: eagerly declared queue holding messages for `d` seconds before
//!   dead-lettering them into `Q.dlx-retry`
//!
//! Every retry cycle adds two entries to the `x-death` count (original queue to wait
//! queue, wait queue to retry exchange), so the wait binding for position `i`
//! matches a count of `i * 2`.

use crate::{
    config::{
        ArgumentValue, AutoCreate, Config, ExchangeConfig, QueueBindingConfig, QueueConfig,
    },
    errors::AmqpError,
    exchange::ExchangeKind,
    topology::{
        AMQP_HEADERS_DEAD_LETTER_EXCHANGE, AMQP_HEADERS_MATCH, AMQP_HEADERS_MESSAGE_TTL,
        AMQP_HEADERS_X_DEATH,
    },
};
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the fanout exchange returning retried messages to `queue`.
pub fn retry_exchange_name(queue: &str) -> String {
    format!("{queue}.dlx-retry")
}

/// Name of the headers exchange dispatching dead-lettered messages to wait queues.
pub fn wait_exchange_name(queue: &str) -> String {
    format!("{queue}.dlx-wait")
}

/// Name of the queue holding messages of `queue` for `seconds` before a retry.
pub fn wait_queue_name(queue: &str, seconds: i64) -> String {
    format!("{queue}.dlx-{seconds}")
}

/// Expands every `dlx` declaration of the configuration.
///
/// Queues without delays (absent or empty) only lose the field. Delays must have
/// been validated already; a non-positive delay is still refused here. A generated
/// name colliding with an existing queue or exchange is a configuration error.
pub fn expand(mut config: Config) -> Result<Config, AmqpError> {
    let pending: Vec<(String, String, Vec<i64>)> = config
        .queues
        .iter_mut()
        .filter_map(|(name, queue)| {
            let delays = queue.dlx.take()?;
            Some((name.clone(), queue.connection.clone(), delays))
        })
        .filter(|(_, _, delays)| !delays.is_empty())
        .collect();

    for (name, connection, delays) in pending {
        debug!("expanding dlx retries for queue: {}", name);

        let retry_exchange = retry_exchange_name(&name);
        let wait_exchange = wait_exchange_name(&name);

        let retry = ExchangeConfig::new(&connection, ExchangeKind::Fanout)
            .auto_create(AutoCreate::Eager)
            .binding(&name, QueueBindingConfig::new());
        let mut wait =
            ExchangeConfig::new(&connection, ExchangeKind::Headers).auto_create(AutoCreate::Eager);

        for (position, seconds) in delays.iter().enumerate() {
            if *seconds <= 0 {
                return Err(AmqpError::ConfigurationError(format!(
                    "queue `{name}` has a non-positive dlx delay `{seconds}`"
                )));
            }

            let ttl = seconds.checked_mul(1000).ok_or_else(|| {
                AmqpError::ConfigurationError(format!(
                    "queue `{name}` has a dlx delay `{seconds}` too large for a message ttl"
                ))
            })?;

            let queue_name = wait_queue_name(&name, *seconds);
            let queue = QueueConfig::new(&connection)
                .auto_create(AutoCreate::Eager)
                .argument(AMQP_HEADERS_DEAD_LETTER_EXCHANGE, retry_exchange.as_str())
                .argument(AMQP_HEADERS_MESSAGE_TTL, ttl);

            let mut death = BTreeMap::new();
            death.insert("name".to_owned(), ArgumentValue::from(name.as_str()));
            death.insert("count".to_owned(), ArgumentValue::Int(position as i64 * 2));

            wait = wait.binding(
                &queue_name,
                QueueBindingConfig::new()
                    .argument(AMQP_HEADERS_MATCH, "all")
                    .argument(AMQP_HEADERS_X_DEATH, death),
            );

            insert_unique(&mut config.queues, queue_name, queue, "queue")?;
        }

        insert_unique(&mut config.exchanges, retry_exchange, retry, "exchange")?;
        insert_unique(&mut config.exchanges, wait_exchange, wait, "exchange")?;
    }

    Ok(config)
}

fn insert_unique<T>(
    entries: &mut BTreeMap<String, T>,
    name: String,
    value: T,
    kind: &str,
) -> Result<(), AmqpError> {
    if entries.contains_key(&name) {
        return Err(AmqpError::ConfigurationError(format!(
            "dlx expansion would redefine {kind} `{name}`"
        )));
    }

    entries.insert(name, value);
    Ok(())
}
