// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::collections::{HashSet, VecDeque};

use csw_chat::{ChatConnection, ChatError};
use csw_data_model::{ChatRef, MessageId, PageToken, UserId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::governor::{OperationClass, RateGovernor};

/// Options for a [`MessageSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// How many hits to request per search call
    pub search_chunk_size: usize,

    /// How many times a throttled page fetch is attempted before giving up
    /// on the chat
    pub max_attempts: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            search_chunk_size: 100,
            max_attempts: 5,
        }
    }
}

/// A chat-level fatal error from the search side
#[derive(Debug, Error)]
pub enum SourceError {
    /// A page fetch was throttled more times than the retry bound allows
    #[error("search retries exhausted after {attempts} throttled attempts")]
    RetriesExhausted {
        /// How many attempts were made
        attempts: u32,
    },

    /// The service could not serve a page fetch; not retried within the run
    #[error("search failed")]
    Unavailable(#[source] ChatError),

    /// The run was cancelled by the operator
    #[error("run cancelled")]
    Cancelled,
}

/// A restartable, lazily-paginated sequence of the message ids a given
/// account authored in a given chat.
///
/// The source asks the backend to filter by author server-side, and checks
/// the author of every hit again client-side: an id authored by someone else
/// is never yielded, whether or not the backend honoured the filter. Ids are
/// also de-duplicated, so an id resurfacing on a later page is yielded only
/// once.
///
/// Not restartable mid-stream: a fresh [`MessageSource::open`] re-queries
/// from the start, which is fine since the read side is idempotent.
pub struct MessageSource<'a, C> {
    connection: &'a C,
    governor: &'a RateGovernor,
    cancellation_token: &'a CancellationToken,
    chat: ChatRef,
    author: UserId,
    options: SourceOptions,

    buffer: VecDeque<MessageId>,
    next_page_token: Option<PageToken>,
    exhausted: bool,
    seen: HashSet<MessageId>,
    observed: usize,
    skipped_foreign: usize,
}

impl<'a, C: ChatConnection> MessageSource<'a, C> {
    /// Open a source over the messages `author` sent to `chat`
    pub fn open(
        connection: &'a C,
        governor: &'a RateGovernor,
        cancellation_token: &'a CancellationToken,
        chat: ChatRef,
        author: UserId,
        options: SourceOptions,
    ) -> Self {
        Self {
            connection,
            governor,
            cancellation_token,
            chat,
            author,
            options,
            buffer: VecDeque::new(),
            next_page_token: None,
            exhausted: false,
            seen: HashSet::new(),
            observed: 0,
            skipped_foreign: 0,
        }
    }

    /// Distinct messages observed so far, self-authored or not
    #[must_use]
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Distinct foreign-authored messages observed and filtered out so far
    #[must_use]
    pub fn skipped_foreign(&self) -> usize {
        self.skipped_foreign
    }

    /// Take the ids already fetched but not yet yielded.
    ///
    /// When a chat is aborted mid-stream, these ids count towards
    /// [`MessageSource::observed`] but were never handed to the caller; the
    /// caller must still classify them for the report to stay exact.
    pub fn drain_buffered(&mut self) -> impl Iterator<Item = MessageId> + '_ {
        self.buffer.drain(..)
    }

    /// The next self-authored message id, or [`None`] at the end of history.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the chat can no longer be processed;
    /// ids yielded before the error remain valid.
    pub async fn next(&mut self) -> Result<Option<MessageId>, SourceError> {
        loop {
            if let Some(id) = self.buffer.pop_front() {
                return Ok(Some(id));
            }

            if self.exhausted {
                return Ok(None);
            }

            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<(), SourceError> {
        let mut attempts = 0;

        let page = loop {
            // Biased so that an already-cancelled token always wins over a
            // zero-wait pace
            tokio::select! {
                biased;

                () = self.cancellation_token.cancelled() => {
                    return Err(SourceError::Cancelled);
                }
                () = self.governor.pace(OperationClass::Search) => {}
            }

            attempts += 1;
            let result = self
                .connection
                .search(
                    &self.chat,
                    Some(&self.author),
                    self.next_page_token.as_ref(),
                    self.options.search_chunk_size,
                )
                .await;

            match result {
                Ok(page) => break page,
                Err(ChatError::Throttled { retry_after }) => {
                    if attempts >= self.options.max_attempts {
                        return Err(SourceError::RetriesExhausted { attempts });
                    }
                    self.governor
                        .on_throttled(OperationClass::Search, retry_after)
                        .await;
                }
                Err(err @ ChatError::Unavailable { .. }) => {
                    return Err(SourceError::Unavailable(err));
                }
            }
        };

        self.exhausted = page.is_last();
        self.next_page_token = page.next_page_token;

        for hit in page.messages {
            // A page can re-surface an id we already saw; only the first
            // sighting counts
            if !self.seen.insert(hit.id.clone()) {
                continue;
            }

            self.observed += 1;
            if hit.author == self.author {
                self.buffer.push_back(hit.id);
            } else {
                self.skipped_foreign += 1;
            }
        }

        Ok(())
    }
}
