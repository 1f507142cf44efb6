// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Errors that reject adapter construction. These are fatal to the route
/// and propagated to whoever owns the inbound record stream.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("no NSQ address was found in '{0}', expected host:port")]
    InvalidAddress(String),

    #[error("no valid NSQ topic was found")]
    InvalidTopic,

    #[error("failed to reach nsqd at {address}: {source}")]
    SinkUnavailable {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Per-message publish failures. These are logged and the record dropped;
/// they never terminate the publish loop or the process.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("connection to nsqd failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("nsqd returned an error frame: {0}")]
    Broker(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}
