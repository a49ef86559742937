// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Structured summary of a sweep run.
//!
//! The report is a plain serializable value: the engine fills it in, and any
//! presentation layer (CLI, log line, API response) formats it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{ChatRef, MessageId};

/// A message which could not be classified as deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// The message which failed, when the failure is per-id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Human-readable reason
    pub reason: String,
}

/// Outcome counters for a single chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReport {
    /// The chat this report covers
    pub chat: ChatRef,

    /// Total messages observed by the search, self-authored or not
    pub observed: usize,

    /// Self-authored messages submitted for deletion
    pub requested: usize,

    /// Messages confirmed gone (deleted, or already absent)
    pub deleted: usize,

    /// Foreign-authored messages observed and left untouched
    pub skipped_foreign: usize,

    /// Messages which could not be deleted
    pub failed: usize,

    /// Details for each failed message
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,

    /// Set when the chat's processing was aborted by a chat-level error.
    /// Per-id bookkeeping up to that point is still valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl ChatReport {
    /// An empty report for the given chat
    #[must_use]
    pub fn new(chat: ChatRef) -> Self {
        Self {
            chat,
            observed: 0,
            requested: 0,
            deleted: 0,
            skipped_foreign: 0,
            failed: 0,
            failures: Vec::new(),
            aborted: None,
        }
    }

    /// Record a per-id failure
    pub fn record_failure(&mut self, id: MessageId, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push(Failure {
            id: Some(id),
            reason: reason.into(),
        });
    }

    /// Every observed message must end up classified exactly once:
    /// deleted, skipped as foreign, or failed.
    #[must_use]
    pub fn reconciles(&self) -> bool {
        self.deleted + self.skipped_foreign + self.failed == self.observed
    }

    /// Whether everything requested was deleted
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.aborted.is_none()
    }
}

/// The aggregated result of one full run, covering every configured chat in
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished or was cancelled
    pub finished_at: DateTime<Utc>,

    /// Whether the run was cancelled by the operator
    pub cancelled: bool,

    /// Per-chat outcomes, in processing order
    pub chats: Vec<ChatReport>,
}

impl RunReport {
    /// Whether any chat ended up degraded
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.cancelled || self.chats.iter().any(|chat| !chat.is_clean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciliation() {
        let mut report = ChatReport::new(ChatRef::from("chat"));
        assert!(report.reconciles());

        report.observed = 10;
        report.requested = 8;
        report.deleted = 7;
        report.skipped_foreign = 2;
        assert!(!report.reconciles());

        report.record_failure(MessageId::from("m8"), "denied");
        assert!(report.reconciles());
        assert!(!report.is_clean());
    }

    #[test]
    fn degraded_run() {
        let clean = ChatReport::new(ChatRef::from("a"));
        let mut aborted = ChatReport::new(ChatRef::from("b"));
        aborted.aborted = Some("service unavailable".to_owned());

        use crate::clock::Clock as _;
        let now = crate::clock::MockClock::default().now();
        let report = RunReport {
            started_at: now,
            finished_at: now,
            cancelled: false,
            chats: vec![clean.clone()],
        };
        assert!(!report.is_degraded());

        let report = RunReport {
            started_at: now,
            finished_at: now,
            cancelled: false,
            chats: vec![clean, aborted],
        };
        assert!(report.is_degraded());
    }
}
