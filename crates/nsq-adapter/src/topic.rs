// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Topic and broker-address resolution for a route.
//!
//! Routes are configured with an address of the form `host[,host...][/topic]`
//! plus an option map. Whatever topic the operator supplies is migrated to the
//! `...#ephemeral` naming dialect rather than rejected.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use crate::errors::AdapterError;

/// Suffix every resolved topic carries.
pub const EPHEMERAL_SUFFIX: &str = "#ephemeral";

/// A validated NSQ topic name: non-empty and ending in `#ephemeral`.
/// Only [`resolve_topic`] produces one, so the invariant is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic(String);

impl Topic {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the destination topic from the route address and options.
///
/// The candidate is the path component of the address when one is present,
/// otherwise the `topic` option. An empty candidate is rejected. The candidate
/// is then split once on `#`: a suffix other than exactly `ephemeral` is
/// rewritten, and a missing `#ephemeral` ending is appended, each logged as a
/// rename.
pub fn resolve_topic(
    address: &str,
    options: &HashMap<String, String>,
) -> Result<Topic, AdapterError> {
    let candidate = match address.split_once('/') {
        Some((_, path)) => path.to_string(),
        None => options.get("topic").cloned().unwrap_or_default(),
    };
    if candidate.is_empty() {
        return Err(AdapterError::InvalidTopic);
    }

    let migrated = match candidate.split_once('#') {
        Some((base, suffix)) if suffix != "ephemeral" => {
            let renamed = format!("{base}{EPHEMERAL_SUFFIX}");
            info!("topic '{candidate}' has been renamed to '{renamed}'");
            renamed
        }
        _ => candidate,
    };

    let topic = if migrated.ends_with(EPHEMERAL_SUFFIX) {
        migrated
    } else {
        let renamed = format!("{migrated}{EPHEMERAL_SUFFIX}");
        info!("topic '{migrated}' has been renamed to '{renamed}'");
        renamed
    };

    Ok(Topic(topic))
}

/// Resolve the nsqd address from the route address: strip any `/topic` path
/// and keep the first comma-separated candidate. Extra candidates are
/// discarded; an address with no usable candidate fails closed.
pub fn resolve_address(address: &str) -> Result<String, AdapterError> {
    let hosts = address.split_once('/').map_or(address, |(hosts, _)| hosts);
    let mut candidates = hosts.split(',').map(str::trim).filter(|c| !c.is_empty());
    let first = candidates
        .next()
        .ok_or_else(|| AdapterError::InvalidAddress(address.to_string()))?;
    let discarded = candidates.count();
    if discarded > 0 {
        debug!("discarding {discarded} extra nsqd address candidate(s) in '{address}', using '{first}'");
    }
    Ok(first.to_string())
}
