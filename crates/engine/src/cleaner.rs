// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use csw_chat::ChatConnection;
use csw_data_model::{ChatRef, ChatReport, Clock, RunReport, UserId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    batcher::{BatchError, BatcherOptions, DeleteBatcher},
    governor::{PacingOptions, RateGovernor},
    source::{MessageSource, SourceError, SourceOptions},
};

/// Options for a [`Cleaner`] run
#[derive(Debug, Clone)]
pub struct CleanerOptions {
    /// The chats to sweep, in processing order
    pub chats: Vec<ChatRef>,

    /// The account whose messages are deleted
    pub acting_user: UserId,

    /// How many hits to request per search call
    pub search_chunk_size: usize,

    /// How many ids go into a single delete call
    pub delete_chunk_size: usize,

    /// How many times a throttled call or id is attempted before giving up
    pub max_attempts: u32,

    /// Pacing policy for outbound calls
    pub pacing: PacingOptions,
}

impl CleanerOptions {
    /// Options with the default chunk sizes, retry bound and pacing
    #[must_use]
    pub fn new(chats: Vec<ChatRef>, acting_user: UserId) -> Self {
        Self {
            chats,
            acting_user,
            search_chunk_size: 100,
            delete_chunk_size: 10,
            max_attempts: 5,
            pacing: PacingOptions::default(),
        }
    }

    /// Set the search chunk size
    #[must_use]
    pub fn with_search_chunk_size(mut self, size: usize) -> Self {
        self.search_chunk_size = size;
        self
    }

    /// Set the delete chunk size
    #[must_use]
    pub fn with_delete_chunk_size(mut self, size: usize) -> Self {
        self.delete_chunk_size = size;
        self
    }

    /// Set the retry bound
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the pacing policy
    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingOptions) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Why a chat could not be processed to the end
#[derive(Debug, Error)]
enum SweepError {
    #[error(transparent)]
    Search(SourceError),

    #[error(transparent)]
    Delete(BatchError),

    #[error("run cancelled")]
    Cancelled,
}

impl From<SourceError> for SweepError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Cancelled => Self::Cancelled,
            other => Self::Search(other),
        }
    }
}

impl From<BatchError> for SweepError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Cancelled => Self::Cancelled,
            other => Self::Delete(other),
        }
    }
}

/// Sweeps the configured chats, deleting every message the acting account
/// authored in them.
///
/// Chats are processed strictly in order, one at a time; the shared
/// [`RateGovernor`] paces all outbound traffic. A chat-level failure aborts
/// that chat only, and the run moves on to the next one. A single cleaner
/// performs a single run: [`Cleaner::run`] consumes it.
pub struct Cleaner<C> {
    connection: C,
    options: CleanerOptions,
    governor: RateGovernor,
    cancellation_token: CancellationToken,
}

impl<C: ChatConnection> Cleaner<C> {
    /// Set up a run over the given connection
    pub fn new(connection: C, options: CleanerOptions) -> Self {
        let governor = RateGovernor::new(&options.pacing);
        Self {
            connection,
            options,
            governor,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// A token which cancels the run when triggered.
    ///
    /// Cancellation is graceful: no further calls are put on the wire, ids
    /// already submitted but not yet deleted are recorded as failed, and
    /// [`Cleaner::run`] returns the report of everything done so far.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Run the sweep to completion and report on it
    pub async fn run(self, clock: &dyn Clock) -> RunReport {
        let started_at = clock.now();
        let mut cancelled = false;
        let mut chats = Vec::with_capacity(self.options.chats.len());

        for chat in &self.options.chats {
            let mut report = ChatReport::new(chat.clone());

            if cancelled {
                report.aborted = Some("run cancelled".to_owned());
                chats.push(report);
                continue;
            }

            tracing::info!(%chat, "Sweeping chat");
            match self.sweep_chat(chat, &mut report).await {
                Ok(()) => {
                    tracing::info!(
                        %chat,
                        deleted = report.deleted,
                        failed = report.failed,
                        "Chat swept",
                    );
                }
                Err(SweepError::Cancelled) => {
                    tracing::warn!(%chat, "Run cancelled");
                    cancelled = true;
                    report.aborted = Some("run cancelled".to_owned());
                }
                Err(err) => {
                    tracing::error!(
                        error = &err as &dyn std::error::Error,
                        %chat,
                        "Chat aborted",
                    );
                    report.aborted = Some(err.to_string());
                }
            }
            chats.push(report);
        }

        RunReport {
            started_at,
            finished_at: clock.now(),
            cancelled,
            chats,
        }
    }

    async fn sweep_chat(
        &self,
        chat: &ChatRef,
        report: &mut ChatReport,
    ) -> Result<(), SweepError> {
        let mut source = MessageSource::open(
            &self.connection,
            &self.governor,
            &self.cancellation_token,
            chat.clone(),
            self.options.acting_user.clone(),
            SourceOptions {
                search_chunk_size: self.options.search_chunk_size,
                max_attempts: self.options.max_attempts,
            },
        );
        let mut batcher = DeleteBatcher::new(
            &self.connection,
            &self.governor,
            &self.cancellation_token,
            chat.clone(),
            BatcherOptions {
                delete_chunk_size: self.options.delete_chunk_size,
                max_attempts: self.options.max_attempts,
            },
        );

        let result = Self::drain(&mut source, &mut batcher, report).await;

        report.observed = source.observed();
        report.skipped_foreign = source.skipped_foreign();

        if let Err(err) = result {
            // Ids fetched or submitted but never resolved still need to be
            // accounted for
            let reason = err.to_string();
            for id in source.drain_buffered() {
                report.record_failure(id, reason.as_str());
            }
            batcher.abandon(report, &reason);
            return Err(err);
        }

        Ok(())
    }

    async fn drain(
        source: &mut MessageSource<'_, C>,
        batcher: &mut DeleteBatcher<'_, C>,
        report: &mut ChatReport,
    ) -> Result<(), SweepError> {
        while let Some(id) = source.next().await? {
            batcher.push(id, report).await?;
        }
        batcher.finish(report).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use csw_chat::{ChatError, MockChatConnection, ReadOnlyChatConnection};
    use csw_data_model::{
        DeleteOutcome, MessageId, MockClock, PageToken, SearchPage,
    };

    use super::*;

    fn options(chats: Vec<ChatRef>) -> CleanerOptions {
        CleanerOptions::new(chats, UserId::from("me"))
            .with_search_chunk_size(3)
            .with_delete_chunk_size(3)
            .with_max_attempts(3)
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_own_messages_and_nothing_else() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("chat");
        let me = UserId::from("me");
        let other = UserId::from("other");
        conn.send_messages(&chat, &me, 7);
        let theirs = conn.send_messages(&chat, &other, 2);

        let cleaner = Cleaner::new(&conn, options(vec![chat.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        assert!(!run.is_degraded());
        let report = &run.chats[0];
        assert_eq!(report.requested, 7);
        assert_eq!(report.deleted, 7);
        assert!(report.reconciles());

        assert!(conn.messages_by(&chat, &me).is_empty());
        assert_eq!(conn.messages_by(&chat, &other), theirs);

        // Every id went into exactly one delete call
        let mut attempted: Vec<MessageId> =
            conn.delete_batches().into_iter().flatten().collect();
        attempted.sort();
        attempted.dedup();
        assert_eq!(attempted.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn a_second_run_has_nothing_left_to_do() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("chat");
        let me = UserId::from("me");
        conn.send_messages(&chat, &me, 4);

        let run = Cleaner::new(&conn, options(vec![chat.clone()]))
            .run(&MockClock::default())
            .await;
        assert_eq!(run.chats[0].deleted, 4);

        let run = Cleaner::new(&conn, options(vec![chat.clone()]))
            .run(&MockClock::default())
            .await;
        let report = &run.chats[0];
        assert_eq!(report.requested, 0);
        assert_eq!(report.observed, 0);
        assert!(report.is_clean());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_search_retries_abort_one_chat_but_not_the_run() {
        let conn = MockChatConnection::new();
        let me = UserId::from("me");
        let first = ChatRef::from("first");
        let second = ChatRef::from("second");
        conn.send_messages(&first, &me, 2);
        conn.send_messages(&second, &me, 2);
        // Enough throttles to exhaust the first chat's retry bound, and no
        // more
        conn.throttle_next_searches(3);

        let cleaner = Cleaner::new(&conn, options(vec![first.clone(), second.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        assert!(run.is_degraded());
        assert!(!run.cancelled);
        assert!(run.chats[0].aborted.is_some());
        assert_eq!(run.chats[0].deleted, 0);
        assert!(run.chats[1].is_clean());
        assert_eq!(run.chats[1].deleted, 2);
        assert_eq!(conn.messages_by(&first, &me).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_messages_are_skipped_when_the_filter_is_not_honoured() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("chat");
        let me = UserId::from("me");
        let other = UserId::from("other");
        conn.send_messages(&chat, &me, 4);
        conn.send_messages(&chat, &other, 3);
        conn.set_ignore_author_filter(true);

        let cleaner = Cleaner::new(&conn, options(vec![chat.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        let report = &run.chats[0];
        assert_eq!(report.observed, 7);
        assert_eq!(report.skipped_foreign, 3);
        assert_eq!(report.deleted, 4);
        assert!(report.reconciles());
        assert_eq!(conn.messages_by(&chat, &other).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn chats_are_processed_in_configured_order() {
        let conn = MockChatConnection::new();
        let me = UserId::from("me");
        let first = ChatRef::from("first");
        let second = ChatRef::from("second");
        conn.send_messages(&first, &me, 1);
        conn.send_messages(&second, &me, 1);

        let cleaner = Cleaner::new(&conn, options(vec![first.clone(), second.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        assert_eq!(run.chats.len(), 2);
        assert_eq!(run.chats[0].chat, first);
        assert_eq!(run.chats[1].chat, second);
        assert!(!run.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn an_empty_chat_yields_a_clean_empty_report() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("empty");

        let cleaner = Cleaner::new(&conn, options(vec![chat]));
        let run = cleaner.run(&MockClock::default()).await;

        let report = &run.chats[0];
        assert_eq!(report.observed, 0);
        assert_eq!(report.deleted, 0);
        assert!(report.is_clean());
        assert!(report.reconciles());
    }

    #[tokio::test(start_paused = true)]
    async fn an_unavailable_chat_aborts_only_that_chat() {
        let conn = MockChatConnection::new();
        let me = UserId::from("me");
        let broken = ChatRef::from("broken");
        let healthy = ChatRef::from("healthy");
        conn.set_unavailable(&broken);
        conn.send_messages(&healthy, &me, 2);

        let cleaner = Cleaner::new(&conn, options(vec![broken.clone(), healthy.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        assert!(run.is_degraded());
        assert!(!run.cancelled);
        assert!(run.chats[0].aborted.is_some());
        assert!(run.chats[1].is_clean());
        assert_eq!(run.chats[1].deleted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_slows_the_run_down_but_does_not_lose_messages() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("chat");
        let me = UserId::from("me");
        let ids = conn.send_messages(&chat, &me, 5);
        conn.throttle_next_searches(1);
        conn.throttle_next_deletes(1);
        conn.throttle_id(&ids[2], 1);
        conn.set_retry_after(Duration::from_secs(5));

        let cleaner = Cleaner::new(&conn, options(vec![chat.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        let report = &run.chats[0];
        assert_eq!(report.deleted, 5);
        assert!(report.is_clean());
        assert!(conn.messages_by(&chat, &me).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn denied_messages_are_reported_and_the_rest_is_deleted() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("chat");
        let me = UserId::from("me");
        let ids = conn.send_messages(&chat, &me, 4);
        conn.deny(&ids[1]);

        let cleaner = Cleaner::new(&conn, options(vec![chat.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        let report = &run.chats[0];
        assert_eq!(report.deleted, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].id, Some(ids[1].clone()));
        assert!(report.reconciles());
        assert!(run.is_degraded());
    }

    /// Wraps a connection and fails every delete call
    struct FailingDeletes<C> {
        inner: C,
    }

    #[async_trait::async_trait]
    impl<C: ChatConnection> ChatConnection for FailingDeletes<C> {
        async fn search(
            &self,
            chat: &ChatRef,
            author: Option<&UserId>,
            page_token: Option<&PageToken>,
            limit: usize,
        ) -> Result<SearchPage, ChatError> {
            self.inner.search(chat, author, page_token, limit).await
        }

        async fn delete(
            &self,
            _chat: &ChatRef,
            _ids: &[MessageId],
        ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError> {
            Err(ChatError::unavailable("deletes are down"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn an_aborted_chat_still_accounts_for_every_observed_id() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("chat");
        let me = UserId::from("me");
        conn.send_messages(&chat, &me, 5);

        // A search page holds more ids than a delete batch, so when the
        // first delete call fails some ids are still buffered on the search
        // side and never reach the batcher
        let wrapper = FailingDeletes { inner: &conn };
        let options = CleanerOptions::new(vec![chat.clone()], me.clone())
            .with_search_chunk_size(5)
            .with_delete_chunk_size(2)
            .with_max_attempts(3);
        let run = Cleaner::new(&wrapper, options)
            .run(&MockClock::default())
            .await;

        let report = &run.chats[0];
        assert!(report.aborted.is_some());
        assert_eq!(report.observed, 5);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.failed, 5);
        assert!(report.reconciles());
        assert_eq!(conn.messages_by(&chat, &me).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn a_read_only_connection_makes_the_run_a_dry_run() {
        let conn = MockChatConnection::new();
        let chat = ChatRef::from("chat");
        let me = UserId::from("me");
        conn.send_messages(&chat, &me, 3);

        let readonly = ReadOnlyChatConnection::new(&conn);
        let cleaner = Cleaner::new(readonly, options(vec![chat.clone()]));
        let run = cleaner.run(&MockClock::default()).await;

        let report = &run.chats[0];
        assert_eq!(report.deleted, 3);
        assert!(report.is_clean());

        // Nothing was actually deleted
        assert_eq!(conn.messages_by(&chat, &me).len(), 3);
        assert!(conn.delete_batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn the_report_carries_the_run_timestamps() {
        let conn = MockChatConnection::new();
        let clock = MockClock::default();
        let started = clock.now();

        let cleaner = Cleaner::new(&conn, options(vec![ChatRef::from("chat")]));
        let run = cleaner.run(&clock).await;

        assert_eq!(run.started_at, started);
        assert_eq!(run.finished_at, started);
        assert!(!run.cancelled);
    }

    /// Wraps a connection and cancels a token once a number of searches have
    /// been served
    struct CancelAfterSearches<C> {
        inner: C,
        remaining: AtomicUsize,
        token: Mutex<Option<CancellationToken>>,
    }

    impl<C> CancelAfterSearches<C> {
        fn new(inner: C, searches: usize) -> Self {
            Self {
                inner,
                remaining: AtomicUsize::new(searches),
                token: Mutex::new(None),
            }
        }

        fn arm(&self, token: CancellationToken) {
            *self.token.lock().unwrap() = Some(token);
        }
    }

    #[async_trait::async_trait]
    impl<C: ChatConnection> ChatConnection for CancelAfterSearches<C> {
        async fn search(
            &self,
            chat: &ChatRef,
            author: Option<&UserId>,
            page_token: Option<&PageToken>,
            limit: usize,
        ) -> Result<SearchPage, ChatError> {
            let page = self.inner.search(chat, author, page_token, limit).await;
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                if let Some(token) = self.token.lock().unwrap().as_ref() {
                    token.cancel();
                }
            }
            page
        }

        async fn delete(
            &self,
            chat: &ChatRef,
            ids: &[MessageId],
        ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError> {
            self.inner.delete(chat, ids).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_run_and_accounts_for_pending_ids() {
        let conn = MockChatConnection::new();
        let me = UserId::from("me");
        let first = ChatRef::from("first");
        let second = ChatRef::from("second");
        conn.send_messages(&first, &me, 2);
        conn.send_messages(&second, &me, 2);

        // Cancel right after the first search page is served
        let wrapper = CancelAfterSearches::new(&conn, 1);
        let cleaner = Cleaner::new(&wrapper, options(vec![first.clone(), second.clone()]));
        wrapper.arm(cleaner.cancellation_token());

        let run = cleaner.run(&MockClock::default()).await;

        assert!(run.cancelled);
        assert!(run.is_degraded());

        // The ids found before cancellation never reached the wire, and are
        // recorded as failed
        let report = &run.chats[0];
        assert_eq!(report.aborted.as_deref(), Some("run cancelled"));
        assert_eq!(report.observed, 2);
        assert_eq!(report.failed, 2);
        assert!(conn.delete_batches().is_empty());

        // The second chat was never touched
        assert_eq!(run.chats[1].aborted.as_deref(), Some("run cancelled"));
        assert_eq!(run.chats[1].observed, 0);
        assert_eq!(conn.messages_by(&second, &me).len(), 2);
    }
}
