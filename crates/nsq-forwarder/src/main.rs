// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Standalone host for the NSQ adapter: reads newline-delimited records
//! from stdin and forwards them to the configured topic. Stands in for a
//! log-collection framework that would otherwise own the record stream.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::collections::HashMap;
use std::env;

use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use nsq_adapter::adapter::{NsqAdapter, RawRecord};
use nsq_adapter::identity::ProcessIdentity;

const RECORD_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("NSQ_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let address = match env::var("NSQ_ADDRESS") {
        Ok(address) => address,
        Err(_) => {
            error!("NSQ_ADDRESS is not set (expected host:port[/topic]). Shutting down forwarder.");
            return;
        }
    };

    let mut options = HashMap::new();
    for (option, var) in [("topic", "NSQ_TOPIC"), ("svc", "NSQ_SVC"), ("app", "NSQ_APP")] {
        if let Ok(value) = env::var(var) {
            options.insert(option.to_string(), value);
        }
    }

    // Docker sets HOSTNAME to the container id; records carrying their own
    // hostname override this.
    let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());

    let identity = ProcessIdentity::generate();
    let adapter = match NsqAdapter::connect(&address, &options, identity).await {
        Ok(adapter) => adapter.with_fallback_hostname(hostname),
        Err(err) => {
            error!("failed to set up NSQ route: {err}");
            return;
        }
    };
    info!("forwarding stdin records to topic '{}'", adapter.topic());

    let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                () = reader_cancel.cancelled() => break,
            };
            match line {
                Ok(Some(line)) => {
                    if record_tx.send(RawRecord::parse_line(&line)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed, stopping forwarder");
                    break;
                }
                Err(err) => {
                    error!("failed to read record from stdin: {err}");
                    break;
                }
            }
        }
    });

    let mut publish_loop = tokio::spawn(adapter.run(record_rx, cancel.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
            cancel.cancel();
            let _ = (&mut publish_loop).await;
        }
        _ = &mut publish_loop => {}
    }

    let _ = reader.await;
}
