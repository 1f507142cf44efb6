// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The downstream sink boundary and the shipped nsqd producer.
//!
//! The publish loop only sees [`Publisher`]; everything below
//! `publish(topic, payload)` is opaque to it. [`NsqProducer`] is a minimal
//! nsqd TCP client speaking the V2 protocol: `PUB` frames out, response and
//! error frames back, heartbeats answered with `NOP`.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::PublishError;

// Sent once per connection; selects the nsqd V2 wire protocol.
const MAGIC_V2: &[u8] = b"  V2";
const FRAME_TYPE_RESPONSE: i32 = 0;
const FRAME_TYPE_ERROR: i32 = 1;
const HEARTBEAT: &[u8] = b"_heartbeat_";

/// Downstream publish capability for one route.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// How failed publishes are retried before the record is dropped.
#[derive(Debug, Clone, Copy)]
pub enum RetryStrategy {
    /// Up to N attempts with no delay between them.
    Immediate(u32),
    /// Up to N attempts, waiting `attempt * delay_ms` before each retry.
    LinearBackoff(u32, u64),
}

impl RetryStrategy {
    fn attempts(&self) -> u32 {
        match self {
            RetryStrategy::Immediate(attempts) | RetryStrategy::LinearBackoff(attempts, _) => {
                (*attempts).max(1)
            }
        }
    }

    async fn wait(&self, completed_attempts: u32) {
        if let RetryStrategy::LinearBackoff(_, delay_ms) = self {
            tokio::time::sleep(Duration::from_millis(
                delay_ms * u64::from(completed_attempts),
            ))
            .await;
        }
    }
}

/// TCP producer for one nsqd.
///
/// The connection is established at construction time so a broken broker
/// rejects the route up front, and re-established lazily after any publish
/// error leaves it in an unknown state.
pub struct NsqProducer {
    address: String,
    timeout: Duration,
    retry_strategy: RetryStrategy,
    conn: Mutex<Option<TcpStream>>,
}

impl NsqProducer {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_RETRY_STRATEGY: RetryStrategy = RetryStrategy::LinearBackoff(3, 100);

    /// Connect to nsqd. The one construction-time network operation.
    pub async fn connect(address: &str) -> Result<NsqProducer, std::io::Error> {
        let stream = Self::handshake(address).await?;
        debug!("connected to nsqd at {address}");
        Ok(NsqProducer {
            address: address.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            retry_strategy: Self::DEFAULT_RETRY_STRATEGY,
            conn: Mutex::new(Some(stream)),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    async fn handshake(address: &str) -> Result<TcpStream, std::io::Error> {
        let mut stream = TcpStream::connect(address).await?;
        stream.write_all(MAGIC_V2).await?;
        Ok(stream)
    }

    async fn publish_once(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut guard = self.conn.lock().await;
        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => {
                debug!("reconnecting to nsqd at {}", self.address);
                Self::handshake(&self.address).await?
            }
        };

        match Self::send_pub(&mut stream, topic, payload).await {
            Ok(()) => {
                *guard = Some(stream);
                Ok(())
            }
            // The connection state is unknown after a failure; drop it and
            // reconnect on the next attempt.
            Err(err) => Err(err),
        }
    }

    async fn send_pub(
        stream: &mut TcpStream,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        let mut frame = Vec::with_capacity(topic.len() + payload.len() + 9);
        frame.extend_from_slice(b"PUB ");
        frame.extend_from_slice(topic.as_bytes());
        frame.push(b'\n');
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(payload);
        stream.write_all(&frame).await?;

        // nsqd interleaves heartbeats with command responses.
        loop {
            let size = stream.read_u32().await?;
            let frame_type = stream.read_i32().await?;
            let mut body = vec![0u8; (size as usize).saturating_sub(4)];
            stream.read_exact(&mut body).await?;

            match frame_type {
                FRAME_TYPE_RESPONSE if body == HEARTBEAT => {
                    stream.write_all(b"NOP\n").await?;
                }
                FRAME_TYPE_RESPONSE => return Ok(()),
                FRAME_TYPE_ERROR => {
                    return Err(PublishError::Broker(
                        String::from_utf8_lossy(&body).into_owned(),
                    ))
                }
                other => {
                    return Err(PublishError::Broker(format!(
                        "unexpected frame type {other}"
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl Publisher for NsqProducer {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let attempts = self.retry_strategy.attempts();
        let mut last_error = PublishError::Timeout(self.timeout);

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.retry_strategy.wait(attempt - 1).await;
                debug!("retrying publish to '{topic}' (attempt {attempt}/{attempts})");
            }

            match tokio::time::timeout(self.timeout, self.publish_once(topic, payload)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => {
                    warn!("publish to '{topic}' failed: {err}");
                    last_error = err;
                }
                Err(_) => {
                    // The attempt was cancelled mid-flight; the connection
                    // state is unknown, so force a reconnect.
                    self.conn.lock().await.take();
                    warn!("publish to '{topic}' timed out after {:?}", self.timeout);
                    last_error = PublishError::Timeout(self.timeout);
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_strategy_always_makes_one_attempt() {
        assert_eq!(RetryStrategy::Immediate(0).attempts(), 1);
        assert_eq!(RetryStrategy::Immediate(3).attempts(), 3);
        assert_eq!(RetryStrategy::LinearBackoff(0, 100).attempts(), 1);
        assert_eq!(RetryStrategy::LinearBackoff(2, 100).attempts(), 2);
    }

    #[tokio::test]
    async fn immediate_strategy_does_not_sleep() {
        let start = std::time::Instant::now();
        RetryStrategy::Immediate(5).wait(4).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
