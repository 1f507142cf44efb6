// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One configured route: the construction path and the publish loop.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace};

use crate::envelope::{Envelope, RecordContext};
use crate::errors::AdapterError;
use crate::identity::ProcessIdentity;
use crate::producer::{NsqProducer, Publisher};
use crate::topic::{resolve_address, resolve_topic, Topic};

/// Service label used when the route supplies no `svc` option.
pub const DEFAULT_SERVICE: &str = "testsvc";
/// Application label used when the route supplies no `app` option.
pub const DEFAULT_APPLICATION: &str = "testapp";

/// One unit of input from the host log-collection framework.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub message: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub caller_file: Option<String>,
    #[serde(default)]
    pub caller_line: Option<String>,
}

impl RawRecord {
    /// A record carrying only the message text.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        RawRecord {
            message: message.into(),
            hostname: String::new(),
            container_name: None,
            caller_file: None,
            caller_line: None,
        }
    }

    /// Parse one inbound line: JSON records pass through, anything else
    /// becomes a plain message record.
    #[must_use]
    pub fn parse_line(line: &str) -> Self {
        serde_json::from_str(line).unwrap_or_else(|_| RawRecord::from_message(line))
    }
}

/// Labels resolved once at construction and stamped on every envelope.
#[derive(Debug, Clone)]
pub struct AdapterLabels {
    pub service: String,
    pub application: String,
    pub environment: Option<String>,
    /// Fallback for records that carry no hostname of their own.
    pub hostname: String,
}

impl AdapterLabels {
    /// Build the labels from the route options, applying the placeholder
    /// defaults for missing `svc`/`app`.
    #[must_use]
    pub fn from_options(options: &HashMap<String, String>) -> Self {
        AdapterLabels {
            service: options
                .get("svc")
                .cloned()
                .unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
            application: options
                .get("app")
                .cloned()
                .unwrap_or_else(|| DEFAULT_APPLICATION.to_string()),
            environment: None,
            hostname: String::new(),
        }
    }
}

/// One route translating an inbound record stream into publishes on a
/// single NSQ topic. Configuration is resolved once at construction and
/// never mutated afterwards.
pub struct NsqAdapter {
    topic: Topic,
    labels: AdapterLabels,
    identity: ProcessIdentity,
    producer: Arc<dyn Publisher>,
}

impl NsqAdapter {
    /// One-shot construction path: resolve the broker address and topic,
    /// read the labels, connect the producer. Any failure rejects the
    /// route; nothing here is retried.
    pub async fn connect(
        address: &str,
        options: &HashMap<String, String>,
        identity: ProcessIdentity,
    ) -> Result<NsqAdapter, AdapterError> {
        let broker = resolve_address(address)?;
        let topic = resolve_topic(address, options)?;
        let producer = NsqProducer::connect(&broker)
            .await
            .map_err(|source| AdapterError::SinkUnavailable {
                address: broker.clone(),
                source,
            })?;
        info!("nsq adapter bound to topic '{topic}' via {broker}");
        Ok(NsqAdapter::with_publisher(
            topic,
            AdapterLabels::from_options(options),
            identity,
            Arc::new(producer),
        ))
    }

    /// Bind a route to an already-constructed sink. Used by tests and by
    /// callers bringing their own [`Publisher`].
    #[must_use]
    pub fn with_publisher(
        topic: Topic,
        labels: AdapterLabels,
        identity: ProcessIdentity,
        producer: Arc<dyn Publisher>,
    ) -> NsqAdapter {
        NsqAdapter {
            topic,
            labels,
            identity,
            producer,
        }
    }

    /// Hostname stamped on records that carry none of their own.
    #[must_use]
    pub fn with_fallback_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.labels.hostname = hostname.into();
        self
    }

    /// Deployment environment label, unset by default.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.labels.environment = Some(environment.into());
        self
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// The publish loop: the adapter's entire lifetime activity.
    ///
    /// Consumes records in arrival order until the channel closes or the
    /// token is cancelled. A record that fails to serialize or publish is
    /// logged and dropped; the loop never stops because of one bad record.
    pub async fn run(self, mut inbound: Receiver<RawRecord>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                record = inbound.recv() => match record {
                    Some(record) => self.ship(&record).await,
                    None => break,
                },
                () = cancel.cancelled() => break,
            }
        }
        info!("nsq adapter for topic '{}' stopped", self.topic);
    }

    async fn ship(&self, record: &RawRecord) {
        let ctx = self.record_context(record);
        let envelope = Envelope::build(&record.message, &ctx, &self.identity);
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                error!("error creating JSON: {err}");
                return;
            }
        };
        if payload.is_empty() {
            return;
        }

        trace!("{}", String::from_utf8_lossy(&payload));
        if let Err(err) = self.producer.publish(self.topic.as_str(), &payload).await {
            error!("dropping record for topic '{}': {err}", self.topic);
        }
    }

    fn record_context(&self, record: &RawRecord) -> RecordContext {
        RecordContext {
            service: self.labels.service.clone(),
            application: self.labels.application.clone(),
            environment: self.labels.environment.clone(),
            hostname: if record.hostname.is_empty() {
                self.labels.hostname.clone()
            } else {
                record.hostname.clone()
            },
            container_name: record.container_name.clone(),
            caller_file: record.caller_file.clone(),
            caller_line: record.caller_line.clone(),
        }
    }
}
