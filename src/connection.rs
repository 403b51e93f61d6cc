// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Management
//!
//! This module keeps broker connections alive across transport failures. Each
//! logical connection name owns exactly one [`Transport`] and at most one cached
//! channel. Channel acquisition that fails with a stale-connection signature
//! rebuilds the transport and retries once; every other transport failure is
//! surfaced as [`AmqpError::ConnectionError`].
//!
//! The main components are:
//! - [`Connection`]: per-name state (transport, cached channel, heartbeat pacing)
//! - [`ConnectionFactory`]: name-indexed manager creating connections on demand

use crate::{
    cache::Memo,
    channel::AmqpChannel,
    config::ConnectionConfig,
    errors::AmqpError,
    registry::ConnectionsDataBag,
    transport::{Transport, TransportError, TransportFactory},
};
use std::sync::Arc;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, error, warn};

struct ConnectionState {
    transport: Box<dyn Transport>,
    channel: Option<Arc<dyn AmqpChannel>>,
    last_beat: Option<Instant>,
}

/// A logical broker connection with a lazily acquired, cached channel.
pub struct Connection {
    name: String,
    config: ConnectionConfig,
    transports: Arc<dyn TransportFactory>,
    state: Mutex<ConnectionState>,
}

impl Connection {
    /// Creates the connection and connects its transport unless the descriptor is lazy.
    ///
    /// # Parameters
    /// * `name` - Logical connection name
    /// * `config` - Connection descriptor
    /// * `transports` - Factory used now and on every reconnect
    ///
    /// # Returns
    /// The connection, or [`AmqpError::ConnectionError`] when an eager connect fails
    pub async fn open(
        name: &str,
        config: ConnectionConfig,
        transports: Arc<dyn TransportFactory>,
    ) -> Result<Connection, AmqpError> {
        let mut transport = transports.create(name, &config);

        if !config.lazy {
            transport
                .connect()
                .await
                .map_err(|err| connection_error(name, err))?;
        }

        Ok(Connection {
            name: name.to_owned(),
            config,
            transports,
            state: Mutex::new(ConnectionState {
                transport,
                channel: None,
                last_beat: None,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the connection descriptor.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns whether every channel of this connection runs in confirm mode.
    pub fn is_publish_confirm(&self) -> bool {
        self.config.publish_confirm
    }

    /// Returns the cached channel, acquiring it first when there is none.
    ///
    /// A stale-connection failure while connecting or opening the channel replaces
    /// the transport with a fresh one and retries exactly once. With publish confirms
    /// enabled every freshly acquired channel is put into confirm mode.
    pub async fn channel(&self) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        let mut state = self.state.lock().await;

        if let Some(channel) = &state.channel {
            return Ok(channel.clone());
        }

        let opened = open_channel(state.transport.as_mut()).await;
        let channel = match opened {
            Ok(channel) => channel,
            Err(err) if err.is_stale_connection() => {
                warn!(
                    error = err.to_string(),
                    name = self.name.as_str(),
                    "stale amqp connection, reconnecting"
                );

                state.transport = self.transports.create(&self.name, &self.config);
                let transport = state.transport.as_mut();
                transport
                    .connect()
                    .await
                    .map_err(|err| connection_error(&self.name, err))?;
                transport
                    .channel()
                    .await
                    .map_err(|err| connection_error(&self.name, err))?
            }
            Err(err) => return Err(connection_error(&self.name, err)),
        };

        if self.config.publish_confirm {
            channel.confirm_select().await.map_err(|err| {
                error!(
                    error = err.to_string(),
                    name = self.name.as_str(),
                    "failure to confirm select"
                );
                AmqpError::ConfirmSelectError(self.name.clone())
            })?;
        }

        state.channel = Some(channel.clone());
        Ok(channel)
    }

    /// Reports the current transport state without connecting.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.transport.is_connected()
    }

    /// Sends a heartbeat unless one was sent less than `max(heartbeat, 1s)` ago.
    pub async fn send_heartbeat(&self) -> Result<(), AmqpError> {
        let mut state = self.state.lock().await;

        let due = state
            .last_beat
            .map_or(true, |last| last.elapsed() >= self.config.heartbeat_interval());

        if !due || !state.transport.is_connected() {
            return Ok(());
        }

        state
            .transport
            .send_heartbeat()
            .await
            .map_err(|err| connection_error(&self.name, err))?;
        state.last_beat = Some(Instant::now());

        Ok(())
    }

    /// Drops the cached channel; the next [`Connection::channel`] opens a new one.
    pub async fn reset_channel(&self) {
        self.state.lock().await.channel = None;
    }

    /// Drops the channel, disconnects the transport and installs a fresh, not yet
    /// connected one.
    pub async fn reset_connection(&self) {
        let mut state = self.state.lock().await;
        state.channel = None;

        if let Err(err) = state.transport.disconnect().await {
            warn!(
                error = err.to_string(),
                name = self.name.as_str(),
                "failure to disconnect while resetting"
            );
        }

        state.transport = self.transports.create(&self.name, &self.config);
        debug!("connection: {} was reset", self.name);
    }
}

/// Name-indexed connection manager.
///
/// Connections are created on first use from the [`ConnectionsDataBag`] and live as
/// long as the factory.
pub struct ConnectionFactory {
    data_bag: Arc<ConnectionsDataBag>,
    transports: Arc<dyn TransportFactory>,
    connections: Memo<Connection>,
}

impl ConnectionFactory {
    /// Creates a manager opening connections from `data_bag`.
    ///
    /// # Parameters
    /// * `data_bag` - Connection descriptors by name
    /// * `transports` - Creates the transport of every connection
    pub fn new(
        data_bag: Arc<ConnectionsDataBag>,
        transports: Arc<dyn TransportFactory>,
    ) -> ConnectionFactory {
        ConnectionFactory {
            data_bag,
            transports,
            connections: Memo::new(),
        }
    }

    /// Returns the registry of connection descriptors.
    pub fn data_bag(&self) -> &ConnectionsDataBag {
        &self.data_bag
    }

    /// Returns the connection registered under `name`, opening it on first use.
    ///
    /// # Returns
    /// The shared connection, a [`AmqpError::FactoryError`] wrapping the registry
    /// miss for an unknown name, or the [`AmqpError::ConnectionError`] of a refused
    /// eager connect, unwrapped
    pub async fn get_connection(&self, name: &str) -> Result<Arc<Connection>, AmqpError> {
        self.connections
            .get_or_try_init(name, || self.create(name))
            .await
            .map_err(|err| match err {
                AmqpError::NotFound { .. } => AmqpError::factory("connection", name, err),
                err => err,
            })
    }

    /// Returns the channel of the named connection, see [`Connection::channel`].
    pub async fn get_channel(&self, name: &str) -> Result<Arc<dyn AmqpChannel>, AmqpError> {
        self.get_connection(name).await?.channel().await
    }

    /// Reports whether the named connection's transport is connected.
    pub async fn is_connected(&self, name: &str) -> Result<bool, AmqpError> {
        Ok(self.get_connection(name).await?.is_connected().await)
    }

    /// Sends a heartbeat on the named connection, see [`Connection::send_heartbeat`].
    pub async fn send_heartbeat(&self, name: &str) -> Result<(), AmqpError> {
        self.get_connection(name).await?.send_heartbeat().await
    }

    /// Replaces the transport of the named connection with a fresh one.
    pub async fn reset_connection(&self, name: &str) -> Result<(), AmqpError> {
        self.get_connection(name).await?.reset_connection().await;
        Ok(())
    }

    async fn create(&self, name: &str) -> Result<Arc<Connection>, AmqpError> {
        let config = self.data_bag.get_data_by_key(name)?.clone();

        debug!("creating connection: {}", name);
        let connection = Connection::open(name, config, self.transports.clone()).await?;

        Ok(Arc::new(connection))
    }
}

async fn open_channel(
    transport: &mut dyn Transport,
) -> Result<Arc<dyn AmqpChannel>, TransportError> {
    if !transport.is_connected() {
        transport.connect().await?;
    }

    transport.channel().await
}

fn connection_error(name: &str, err: TransportError) -> AmqpError {
    error!(error = err.to_string(), name = name, "amqp connection failure");
    AmqpError::ConnectionError {
        message: err.message,
        code: err.code,
    }
}
