// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::{HashMap, VecDeque};

use csw_chat::{ChatConnection, ChatError};
use csw_data_model::{ChatRef, ChatReport, DeleteOutcome, MessageId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::governor::{OperationClass, RateGovernor};

/// Options for a [`DeleteBatcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatcherOptions {
    /// How many ids go into a single delete call
    pub delete_chunk_size: usize,

    /// How many times a throttled id is attempted before being recorded as
    /// failed
    pub max_attempts: u32,
}

impl Default for BatcherOptions {
    fn default() -> Self {
        Self {
            delete_chunk_size: 10,
            max_attempts: 5,
        }
    }
}

/// A chat-level fatal error from the delete side
#[derive(Debug, Error)]
pub enum BatchError {
    /// The service could not serve a delete call; the affected ids are
    /// already recorded as failed in the report
    #[error("deletion failed")]
    Unavailable(#[source] ChatError),

    /// The run was cancelled by the operator; undispatched ids are still
    /// pending and must be [`DeleteBatcher::abandon`]ed
    #[error("run cancelled")]
    Cancelled,
}

/// Groups message ids into bounded delete calls and keeps the report's
/// per-id bookkeeping exact.
///
/// Every id pushed into the batcher ends up in exactly one report bucket:
/// `deleted` when the service confirms it gone (deleted or already absent),
/// `failed` when it was denied, throttled past the retry bound, or caught by
/// a chat-level error. Throttled ids are requeued rather than retried in
/// place, so one stubborn id cannot stall the ids behind it.
pub struct DeleteBatcher<'a, C> {
    connection: &'a C,
    governor: &'a RateGovernor,
    cancellation_token: &'a CancellationToken,
    chat: ChatRef,
    options: BatcherOptions,

    pending: VecDeque<MessageId>,
    throttle_counts: HashMap<MessageId, u32>,
}

impl<'a, C: ChatConnection> DeleteBatcher<'a, C> {
    /// Create a batcher deleting from the given chat
    pub fn new(
        connection: &'a C,
        governor: &'a RateGovernor,
        cancellation_token: &'a CancellationToken,
        chat: ChatRef,
        options: BatcherOptions,
    ) -> Self {
        Self {
            connection,
            governor,
            cancellation_token,
            chat,
            options,
            pending: VecDeque::new(),
            throttle_counts: HashMap::new(),
        }
    }

    /// Submit an id for deletion, flushing full batches as they form.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchError`] when the chat can no longer be processed.
    pub async fn push(
        &mut self,
        id: MessageId,
        report: &mut ChatReport,
    ) -> Result<(), BatchError> {
        report.requested += 1;
        self.pending.push_back(id);

        while self.pending.len() >= self.options.delete_chunk_size {
            self.dispatch(report).await?;
        }

        Ok(())
    }

    /// Flush every id still pending, including requeued ones.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchError`] when the chat can no longer be processed.
    pub async fn finish(&mut self, report: &mut ChatReport) -> Result<(), BatchError> {
        while !self.pending.is_empty() {
            self.dispatch(report).await?;
        }

        Ok(())
    }

    /// Record every pending id as failed with the given reason.
    ///
    /// Called after a chat-level error or a cancellation, so the report still
    /// accounts for the ids which never made it onto the wire.
    pub fn abandon(&mut self, report: &mut ChatReport, reason: &str) {
        for id in self.pending.drain(..) {
            report.record_failure(id, reason);
        }
    }

    async fn dispatch(&mut self, report: &mut ChatReport) -> Result<(), BatchError> {
        // Pace before draining the batch, so a cancellation here leaves the
        // pending ids intact for abandon. Biased so that an already-cancelled
        // token always wins over a zero-wait pace.
        tokio::select! {
            biased;

            () = self.cancellation_token.cancelled() => {
                return Err(BatchError::Cancelled);
            }
            () = self.governor.pace(OperationClass::Delete) => {}
        }

        let take = self.pending.len().min(self.options.delete_chunk_size);
        let batch: Vec<MessageId> = self.pending.drain(..take).collect();

        let outcomes = match self.connection.delete(&self.chat, &batch).await {
            Ok(outcomes) => outcomes,
            Err(ChatError::Throttled { retry_after }) => {
                self.governor
                    .on_throttled(OperationClass::Delete, retry_after)
                    .await;
                for id in batch {
                    self.requeue(id, report);
                }
                return Ok(());
            }
            Err(err @ ChatError::Unavailable { .. }) => {
                for id in batch {
                    report.record_failure(id, "service unavailable");
                }
                return Err(BatchError::Unavailable(err));
            }
        };

        let mut any_throttled = false;
        for (id, outcome) in outcomes {
            match outcome {
                // An id that was already gone still counts as deleted: the
                // goal state is "no such message", and it is reached
                DeleteOutcome::Deleted | DeleteOutcome::NotFound => report.deleted += 1,
                DeleteOutcome::Denied => report.record_failure(id, "deletion denied"),
                DeleteOutcome::Throttled => {
                    any_throttled = true;
                    self.requeue(id, report);
                }
            }
        }

        if any_throttled {
            // One backoff bump per call, however many ids it throttled
            self.governor
                .on_throttled(OperationClass::Delete, None)
                .await;
        }

        Ok(())
    }

    fn requeue(&mut self, id: MessageId, report: &mut ChatReport) {
        let count = self.throttle_counts.entry(id.clone()).or_insert(0);
        *count += 1;

        if *count >= self.options.max_attempts {
            report.record_failure(id, "delete retries exhausted");
        } else {
            self.pending.push_back(id);
        }
    }
}
