// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-lifetime identity stamped on every envelope this process ships.

use uuid::Uuid;

/// Correlation identifiers for the forwarding process.
///
/// All three identifiers currently carry the same token: downstream
/// consumers correlate `process_ctx_id`, `ctx_id` and `parent_ctx_id` by
/// equality. They are stored as separate fields so they can diverge later
/// without touching the envelope or the wire format.
#[derive(Debug, Clone)]
pub struct ProcessIdentity {
    process_id: String,
    context_id: String,
    parent_context_id: String,
}

impl ProcessIdentity {
    /// Generate the identity for this process. Called once at startup; the
    /// value is read-only for the rest of the process lifetime.
    #[must_use]
    pub fn generate() -> Self {
        let token = Uuid::new_v4().to_string();
        ProcessIdentity {
            process_id: token.clone(),
            context_id: token.clone(),
            parent_context_id: token,
        }
    }

    #[must_use]
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    #[must_use]
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    #[must_use]
    pub fn parent_context_id(&self) -> &str {
        &self.parent_context_id
    }
}
