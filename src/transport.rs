// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Transport Boundary
//!
//! This module defines the connection-level boundary consumed by the connection
//! manager: connect, disconnect, open a channel, send a heartbeat and report the
//! connection state. [`LapinTransport`] implements it on top of a lapin
//! `Connection`.
//!
//! Transport failures are reported as [`TransportError`]. Two messages mark a stale
//! connection that is worth rebuilding; the lapin adapter maps its I/O and
//! connection-state errors onto them so the classification stays a plain string
//! contract.

use crate::{
    channel::AmqpChannel,
    config::{ConnectionConfig, TlsOptions},
};
use async_trait::async_trait;
use lapin::{
    tcp::OwnedTLSConfig,
    types::LongString,
    uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo},
    Connection, ConnectionProperties,
};
#[cfg(test)]
use mockall::automock;
use std::{io::ErrorKind, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, trace};

/// Transport message of a connection whose socket was closed under us
pub const BROKEN_PIPE: &str = "Broken pipe or closed connection.";
/// Transport message of a failed socket write
pub const SOCKET_WRITE_FAILED: &str = "Could not write data to socket.";

const REPLY_SUCCESS: u16 = 200;

/// Error raised by a [`Transport`] or an [`AmqpChannel`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub code: u16,
}

impl TransportError {
    pub fn new(message: impl Into<String>, code: u16) -> Self {
        TransportError {
            message: message.into(),
            code,
        }
    }

    /// Whether the failure comes from a connection that went away and may be rebuilt.
    pub fn is_stale_connection(&self) -> bool {
        self.message == BROKEN_PIPE || self.message == SOCKET_WRITE_FAILED
    }
}

impl From<lapin::Error> for TransportError {
    fn from(err: lapin::Error) -> Self {
        match &err {
            lapin::Error::IOError(io) => match io.kind() {
                ErrorKind::WriteZero => TransportError::new(SOCKET_WRITE_FAILED, 0),
                ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof => TransportError::new(BROKEN_PIPE, 0),
                _ => TransportError::new(err.to_string(), 0),
            },
            lapin::Error::InvalidConnectionState(_) => TransportError::new(BROKEN_PIPE, 0),
            _ => TransportError::new(err.to_string(), 0),
        }
    }
}

/// One physical connection to the broker.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Closes the connection and waits for the broker to acknowledge it.
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    async fn channel(&self) -> Result<Arc<dyn AmqpChannel>, TransportError>;

    async fn send_heartbeat(&self) -> Result<(), TransportError>;
}

/// Builds fresh, not yet connected transports for a connection descriptor.
pub trait TransportFactory: Send + Sync {
    fn create(&self, name: &str, config: &ConnectionConfig) -> Box<dyn Transport>;
}

/// [`Transport`] backed by a lapin connection.
pub struct LapinTransport {
    name: String,
    config: ConnectionConfig,
    connection: Option<Connection>,
}

impl LapinTransport {
    pub fn new(name: &str, config: &ConnectionConfig) -> LapinTransport {
        LapinTransport {
            name: name.to_owned(),
            config: config.clone(),
            connection: None,
        }
    }

    fn io_timeout(&self) -> Duration {
        self.config.read_write_timeout()
    }

    async fn open(&self) -> Result<Connection, TransportError> {
        let uri = amqp_uri(&self.config);
        let options = ConnectionProperties::default()
            .with_connection_name(LongString::from(self.name.clone()));

        match &self.config.ssl {
            Some(tls) => {
                let tls = tls_config(tls).await?;
                Connection::connect_uri_with_config(uri, options, tls)
                    .await
                    .map_err(TransportError::from)
            }
            None => Connection::connect_uri(uri, options)
                .await
                .map_err(TransportError::from),
        }
    }
}

#[async_trait]
impl Transport for LapinTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        debug!("creating amqp connection: {}", self.name);

        let conn = match timeout(self.io_timeout(), self.open()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::new("connection attempt timed out", 0)),
        }
        .inspect_err(|err| {
            error!(
                error = err.to_string(),
                name = self.name.as_str(),
                "failure to connect"
            )
        })?;

        self.connection = Some(conn);
        debug!("amqp connected: {}", self.name);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(conn) = self.connection.take() else {
            return Ok(());
        };

        if !conn.status().connected() {
            return Ok(());
        }

        debug!("closing amqp connection: {}", self.name);
        conn.close(REPLY_SUCCESS, "OK")
            .await
            .map_err(TransportError::from)
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| conn.status().connected())
    }

    async fn channel(&self) -> Result<Arc<dyn AmqpChannel>, TransportError> {
        let conn = self
            .connection
            .as_ref()
            .ok_or_else(|| TransportError::new(BROKEN_PIPE, 0))?;

        debug!("creating amqp channel...");
        let channel = match timeout(self.io_timeout(), conn.create_channel()).await {
            Ok(result) => result.map_err(TransportError::from),
            Err(_) => Err(TransportError::new("channel creation timed out", 0)),
        }?;
        debug!("channel created");

        Ok(Arc::new(channel))
    }

    async fn send_heartbeat(&self) -> Result<(), TransportError> {
        // lapin writes heartbeat frames from its own I/O loop at the negotiated
        // interval; a healthy status is all there is to check here.
        if !self.is_connected() {
            return Err(TransportError::new(BROKEN_PIPE, 0));
        }

        trace!("heartbeat: {}", self.name);
        Ok(())
    }
}

/// Creates [`LapinTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapinTransportFactory;

impl TransportFactory for LapinTransportFactory {
    fn create(&self, name: &str, config: &ConnectionConfig) -> Box<dyn Transport> {
        Box::new(LapinTransport::new(name, config))
    }
}

/// Builds the broker URI of a connection descriptor.
pub fn amqp_uri(config: &ConnectionConfig) -> AMQPUri {
    AMQPUri {
        scheme: match config.ssl {
            Some(_) => AMQPScheme::AMQPS,
            None => AMQPScheme::AMQP,
        },
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config.user.clone(),
                password: config.password.clone(),
            },
            host: config.host.clone(),
            port: config.port,
        },
        vhost: config.vhost.clone(),
        query: AMQPQueryString {
            heartbeat: Some(config.heartbeat.clamp(0.0, u16::MAX as f64) as u16),
            connection_timeout: Some((config.timeout.max(0.0) * 1000.0) as u64),
            ..AMQPQueryString::default()
        },
    }
}

async fn tls_config(tls: &TlsOptions) -> Result<OwnedTLSConfig, TransportError> {
    let cert_chain = match &tls.cafile {
        Some(path) => Some(tokio::fs::read_to_string(path).await.map_err(|err| {
            error!(error = err.to_string(), path = %path.display(), "failure to read cafile");
            TransportError::new(format!("{}: {}", path.display(), err), 0)
        })?),
        None => None,
    };

    Ok(OwnedTLSConfig {
        identity: None,
        cert_chain,
    })
}
