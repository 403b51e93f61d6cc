// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Fakes shared by the unit tests.

use crate::{
    channel::AmqpChannel,
    config::ConnectionConfig,
    connection::ConnectionFactory,
    registry::{ConnectionsDataBag, DataBag},
    transport::{MockTransport, Transport, TransportError, TransportFactory},
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, ExchangeKind,
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Hands out the queued transports in order.
pub(crate) struct StubTransports {
    pending: Mutex<VecDeque<MockTransport>>,
    created: AtomicUsize,
}

impl StubTransports {
    pub(crate) fn new(transports: Vec<MockTransport>) -> Arc<StubTransports> {
        Arc::new(StubTransports {
            pending: Mutex::new(transports.into()),
            created: AtomicUsize::new(0),
        })
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for StubTransports {
    fn create(&self, _name: &str, _config: &ConnectionConfig) -> Box<dyn Transport> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let transport = self
            .pending
            .lock()
            .unwrap()
            .pop_front()
            .expect("no transport left");
        Box::new(transport)
    }
}

/// Every transport it creates is healthy and opens the same channel.
pub(crate) struct SharedChannelTransports(pub(crate) Arc<dyn AmqpChannel>);

impl TransportFactory for SharedChannelTransports {
    fn create(&self, _name: &str, _config: &ConnectionConfig) -> Box<dyn Transport> {
        Box::new(healthy_transport(self.0.clone()))
    }
}

/// A transport that connects, disconnects and opens `channel` without failing.
pub(crate) fn healthy_transport(channel: Arc<dyn AmqpChannel>) -> MockTransport {
    let connected = Arc::new(AtomicBool::new(false));
    let mut transport = MockTransport::new();

    let state = connected.clone();
    transport.expect_connect().returning(move || {
        state.store(true, Ordering::SeqCst);
        Ok(())
    });

    let state = connected.clone();
    transport.expect_disconnect().returning(move || {
        state.store(false, Ordering::SeqCst);
        Ok(())
    });

    let state = connected.clone();
    transport
        .expect_is_connected()
        .returning(move || state.load(Ordering::SeqCst));

    transport
        .expect_channel()
        .returning(move || Ok(channel.clone()));
    transport.expect_send_heartbeat().returning(|| Ok(()));

    transport
}

/// Default connection descriptors under the given names.
pub(crate) fn connections(names: &[&str]) -> ConnectionsDataBag {
    let data: BTreeMap<String, ConnectionConfig> = names
        .iter()
        .map(|name| ((*name).to_owned(), ConnectionConfig::default()))
        .collect();

    DataBag::new(data)
}

/// A connection factory whose connections all share one recording channel.
pub(crate) fn recording_connections(
    names: &[&str],
    channel: Arc<RecordingChannel>,
) -> Arc<ConnectionFactory> {
    Arc::new(ConnectionFactory::new(
        Arc::new(connections(names)),
        Arc::new(SharedChannelTransports(channel)),
    ))
}

#[derive(Debug, Clone)]
pub(crate) enum Call {
    ConfirmSelect,
    ExchangeDeclare {
        name: String,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    },
    QueueDeclare {
        name: String,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    },
    QueueBind {
        queue: String,
        exchange: String,
        routing_key: String,
        arguments: FieldTable,
    },
    Publish {
        exchange: String,
        routing_key: String,
        payload: Vec<u8>,
        properties: BasicProperties,
    },
}

/// Channel fake recording every call in order.
#[derive(Default)]
pub(crate) struct RecordingChannel {
    calls: Mutex<Vec<Call>>,
    publish_error: Mutex<Option<TransportError>>,
}

impl RecordingChannel {
    pub(crate) fn new() -> Arc<RecordingChannel> {
        Arc::new(RecordingChannel::default())
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fail_publish(&self, err: TransportError) {
        *self.publish_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn declared_queues(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::QueueDeclare { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn declared_exchanges(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::ExchangeDeclare { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// `(queue, exchange, routing key)` of every bind call.
    pub(crate) fn bindings(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::QueueBind {
                    queue,
                    exchange,
                    routing_key,
                    ..
                } => Some((queue, exchange, routing_key)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AmqpChannel for RecordingChannel {
    async fn confirm_select(&self) -> Result<(), TransportError> {
        self.record(Call::ConfirmSelect);
        Ok(())
    }

    async fn exchange_declare(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError> {
        self.record(Call::ExchangeDeclare {
            name: name.to_owned(),
            kind,
            options,
            arguments,
        });
        Ok(())
    }

    async fn queue_declare(
        &self,
        name: &str,
        options: QueueDeclareOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError> {
        self.record(Call::QueueDeclare {
            name: name.to_owned(),
            options,
            arguments,
        });
        Ok(())
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        _options: QueueBindOptions,
        arguments: FieldTable,
    ) -> Result<(), TransportError> {
        self.record(Call::QueueBind {
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            arguments,
        });
        Ok(())
    }

    async fn basic_publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), TransportError> {
        if let Some(err) = self.publish_error.lock().unwrap().take() {
            return Err(err);
        }

        self.record(Call::Publish {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            payload: payload.to_vec(),
            properties,
        });
        Ok(())
    }
}
