// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The structured JSON envelope shipped downstream for every record.
//!
//! The serialized field names are the compatibility surface consumed by
//! downstream NSQ subscribers; do not rename them.

use chrono::Utc;
use serde::Serialize;

use crate::identity::ProcessIdentity;

/// Severity stamped on every forwarded record: these are raw, unparsed
/// log lines, not leveled application logs.
pub const SEVERITY_RAW: &str = "raw";

// ISO-8601 with microsecond precision, UTC "Z" suffix.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Context the adapter attaches to one record when building its envelope:
/// the route labels plus whatever the record itself carried.
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    pub service: String,
    pub application: String,
    pub hostname: String,
    pub environment: Option<String>,
    pub container_name: Option<String>,
    pub caller_file: Option<String>,
    pub caller_line: Option<String>,
}

/// One outbound message: `meta` identifies the forwarding process, `data`
/// carries the record.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub meta: Meta,
    pub data: Data,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    #[serde(rename = "process_ctx_id")]
    pub process: String,
    #[serde(rename = "ctx_id")]
    pub ctx: String,
}

#[derive(Debug, Serialize)]
pub struct Data {
    #[serde(rename = "parent_ctx_id")]
    pub parent_ctx: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(rename = "dockername", skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub hostname: String,
    pub timestamp: String,
    pub severity: String,
    pub application: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_file: Option<String>,
    #[serde(rename = "msg")]
    pub message: String,
}

impl Envelope {
    /// Build the envelope for one raw record. Pure apart from reading the
    /// wall clock; the timestamp is always generated here, never passed in,
    /// and `msg` is the verbatim record text.
    #[must_use]
    pub fn build(message: &str, ctx: &RecordContext, identity: &ProcessIdentity) -> Envelope {
        Envelope {
            meta: Meta {
                process: identity.process_id().to_string(),
                ctx: identity.context_id().to_string(),
            },
            data: Data {
                parent_ctx: identity.parent_context_id().to_string(),
                service: ctx.service.clone(),
                environment: ctx.environment.clone(),
                container_name: ctx.container_name.clone(),
                hostname: ctx.hostname.clone(),
                timestamp: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
                severity: SEVERITY_RAW.to_string(),
                application: ctx.application.clone(),
                caller_line: ctx.caller_line.clone(),
                caller_file: ctx.caller_file.clone(),
                message: message.to_string(),
            },
        }
    }
}
