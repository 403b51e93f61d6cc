// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod cache;
mod otel;

#[cfg(test)]
mod test_support;

pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod dlx;
pub mod errors;
pub mod exchange;
pub mod producer;
pub mod queue;
pub mod registry;
pub mod topology;
pub mod transport;

pub use cache::CreatedCallback;
pub use client::Client;
pub use config::Config;
pub use errors::AmqpError;
pub use producer::PublishMessage;
