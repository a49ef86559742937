// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use csw_data_model::{ChatRef, DeleteOutcome, MessageId, PageToken, SearchPage, UserId};

use crate::{ChatConnection, ChatError};

/// A wrapper around a [`ChatConnection`] that never deletes anything.
///
/// Searches pass through to the wrapped connection; deletions are answered
/// locally, reporting every id as [`DeleteOutcome::Deleted`] without touching
/// the service. This lets a full run execute as a dry-run: the report shows
/// what would have been deleted.
pub struct ReadOnlyChatConnection<C> {
    inner: C,
}

impl<C> ReadOnlyChatConnection<C> {
    pub fn new(inner: C) -> Self
    where
        C: ChatConnection,
    {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<C: ChatConnection> ChatConnection for ReadOnlyChatConnection<C> {
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
        chat: &ChatRef,
        ids: &[MessageId],
    ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError> {
        tracing::debug!(%chat, count = ids.len(), "Read-only mode, skipping deletion");
        Ok(ids
            .iter()
            .map(|id| (id.clone(), DeleteOutcome::Deleted))
            .collect())
    }
}
