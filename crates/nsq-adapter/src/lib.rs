// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log-forwarding adapter that republishes host log records onto an NSQ topic.
//!
//! One adapter instance owns one route: records arrive on an inbound channel,
//! each is wrapped in a structured JSON envelope and published to a single
//! resolved topic. Construction failures reject the route; per-record failures
//! are logged and the offending record dropped, the loop never stops for one
//! bad record.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod adapter;
pub mod envelope;
pub mod errors;
pub mod identity;
pub mod producer;
pub mod topic;
