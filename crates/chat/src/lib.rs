// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! The capability interface over the remote chat service, with an in-memory
//! mock and a read-only wrapper for dry-runs.

mod mock;
mod readonly;

use std::{sync::Arc, time::Duration};

use csw_data_model::{ChatRef, DeleteOutcome, MessageId, PageToken, SearchPage, UserId};
use thiserror::Error;

pub use self::{mock::MockChatConnection, readonly::ReadOnlyChatConnection};

/// Error returned by a [`ChatConnection`] call.
///
/// The distinction matters to callers: a throttled call may be retried after
/// backing off, an unavailable service may not be retried within the run.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The service rejected the call because of flood control
    #[error("throttled by the chat service")]
    Throttled {
        /// Delay suggested by the service before calling again, if it gave
        /// one
        retry_after: Option<Duration>,
    },

    /// The service could not serve the call at all
    #[error("chat service unavailable: {reason}")]
    Unavailable {
        /// What went wrong, as reported by the service or the transport
        reason: String,

        /// The underlying error, when there is one
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl ChatError {
    /// Shorthand for an [`ChatError::Unavailable`] without an underlying
    /// error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            source: None,
        }
    }
}

/// Narrow capability interface over the remote chat service.
///
/// This is the only surface the deletion engine talks to: everything about
/// authentication, connection handling and serialization lives behind it.
#[async_trait::async_trait]
pub trait ChatConnection: Send + Sync {
    /// Search a chat's history, one page at a time.
    ///
    /// `author` asks the service to filter to that account's messages
    /// server-side where it supports it. Callers must not rely on the filter
    /// having been applied: every returned [`SearchPage`] hit carries its
    /// author so the caller can check.
    ///
    /// At most `limit` hits are returned per page. A page without a
    /// `next_page_token` is the last one for this query.
    ///
    /// # Errors
    ///
    /// Returns an error if the service throttled the call or is unavailable.
    async fn search(
        &self,
        chat: &ChatRef,
        author: Option<&UserId>,
        page_token: Option<&PageToken>,
        limit: usize,
    ) -> Result<SearchPage, ChatError>;

    /// Delete a batch of messages from a chat.
    ///
    /// The call reports an outcome per message id, never an all-or-nothing
    /// result: some ids of a batch may be deleted while others are denied or
    /// throttled.
    ///
    /// # Errors
    ///
    /// Returns an error if the call as a whole was throttled or the service
    /// is unavailable; in that case nothing can be assumed about any id in
    /// the batch.
    async fn delete(
        &self,
        chat: &ChatRef,
        ids: &[MessageId],
    ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError>;
}

#[async_trait::async_trait]
impl<T: ChatConnection + Send + Sync + ?Sized> ChatConnection for &T {
    async fn search(
        &self,
        chat: &ChatRef,
        author: Option<&UserId>,
        page_token: Option<&PageToken>,
        limit: usize,
    ) -> Result<SearchPage, ChatError> {
        (**self).search(chat, author, page_token, limit).await
    }

    async fn delete(
        &self,
        chat: &ChatRef,
        ids: &[MessageId],
    ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError> {
        (**self).delete(chat, ids).await
    }
}

// Implement for Arc<T> where T: ChatConnection
#[async_trait::async_trait]
impl<T: ChatConnection + ?Sized> ChatConnection for Arc<T> {
    async fn search(
        &self,
        chat: &ChatRef,
        author: Option<&UserId>,
        page_token: Option<&PageToken>,
        limit: usize,
    ) -> Result<SearchPage, ChatError> {
        (**self).search(chat, author, page_token, limit).await
    }

    async fn delete(
        &self,
        chat: &ChatRef,
        ids: &[MessageId],
    ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError> {
        (**self).delete(chat, ids).await
    }
}
