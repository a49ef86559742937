// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! An in-memory [`ChatConnection`], used by the engine test-suites.
//!
//! Besides holding per-chat message lists, it records the size of every
//! search and delete call, and can inject the whole failure taxonomy: call
//! level throttling, per-id throttled or denied outcomes, and unavailable
//! chats.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use csw_data_model::{
    ChatRef, DeleteOutcome, MessageId, MessageRef, PageToken, SearchPage, UserId,
};

use crate::{ChatConnection, ChatError};

#[derive(Default)]
struct Inner {
    /// Live message store, in send order
    chats: HashMap<ChatRef, Vec<MessageRef>>,

    /// Queries paginate over a snapshot taken at the first page, like the
    /// stable cursors real services hand out, so deletions issued while a
    /// query is in flight don't shift later pages.
    snapshots: HashMap<u64, Vec<MessageRef>>,
    next_snapshot: u64,

    unavailable: HashSet<ChatRef>,
    denied: HashSet<MessageId>,
    throttled_ids: HashMap<MessageId, u32>,
    throttled_searches: u32,
    throttled_deletes: u32,
    retry_after: Option<Duration>,
    ignore_author_filter: bool,

    search_limits: Vec<usize>,
    delete_batches: Vec<Vec<MessageId>>,

    message_counter: u64,
}

/// A [`ChatConnection`] backed by in-memory state
#[derive(Default)]
pub struct MockChatConnection {
    inner: Mutex<Inner>,
}

impl MockChatConnection {
    /// Create an empty connection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a message with a chosen id into a chat
    pub fn seed_message(&self, chat: &ChatRef, id: MessageId, author: &UserId) {
        let mut inner = self.inner.lock().unwrap();
        inner.chats.entry(chat.clone()).or_default().push(MessageRef {
            id,
            author: author.clone(),
        });
    }

    /// Put `count` messages by the given author into a chat, returning their
    /// generated ids
    pub fn send_messages(&self, chat: &ChatRef, author: &UserId, count: usize) -> Vec<MessageId> {
        let mut inner = self.inner.lock().unwrap();
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            inner.message_counter += 1;
            let id = MessageId::new(format!("m{}", inner.message_counter));
            ids.push(id.clone());
            inner.chats.entry(chat.clone()).or_default().push(MessageRef {
                id,
                author: author.clone(),
            });
        }
        ids
    }

    /// The ids of the messages a given author still has in a chat
    #[must_use]
    pub fn messages_by(&self, chat: &ChatRef, author: &UserId) -> Vec<MessageId> {
        let inner = self.inner.lock().unwrap();
        inner
            .chats
            .get(chat)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|message| &message.author == author)
                    .map(|message| message.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make every call on the given chat fail with
    /// [`ChatError::Unavailable`]
    pub fn set_unavailable(&self, chat: &ChatRef) {
        self.inner.lock().unwrap().unavailable.insert(chat.clone());
    }

    /// Make deletions of the given id report [`DeleteOutcome::Denied`]
    pub fn deny(&self, id: &MessageId) {
        self.inner.lock().unwrap().denied.insert(id.clone());
    }

    /// Make the next `times` deletions of the given id report
    /// [`DeleteOutcome::Throttled`]
    pub fn throttle_id(&self, id: &MessageId, times: u32) {
        self.inner.lock().unwrap().throttled_ids.insert(id.clone(), times);
    }

    /// Fail the next `count` search calls with [`ChatError::Throttled`]
    pub fn throttle_next_searches(&self, count: u32) {
        self.inner.lock().unwrap().throttled_searches = count;
    }

    /// Fail the next `count` delete calls with [`ChatError::Throttled`]
    pub fn throttle_next_deletes(&self, count: u32) {
        self.inner.lock().unwrap().throttled_deletes = count;
    }

    /// Attach a suggested delay to injected throttling errors
    pub fn set_retry_after(&self, retry_after: Duration) {
        self.inner.lock().unwrap().retry_after = Some(retry_after);
    }

    /// Simulate a backend which cannot filter by author server-side and
    /// returns every message regardless of the filter
    pub fn set_ignore_author_filter(&self, ignore: bool) {
        self.inner.lock().unwrap().ignore_author_filter = ignore;
    }

    /// The `limit` of every search call made so far
    #[must_use]
    pub fn search_limits(&self) -> Vec<usize> {
        self.inner.lock().unwrap().search_limits.clone()
    }

    /// The ids of every delete call made so far, one entry per call
    #[must_use]
    pub fn delete_batches(&self) -> Vec<Vec<MessageId>> {
        self.inner.lock().unwrap().delete_batches.clone()
    }

    /// The batch size of every delete call made so far
    #[must_use]
    pub fn delete_sizes(&self) -> Vec<usize> {
        self.inner
            .lock()
            .unwrap()
            .delete_batches
            .iter()
            .map(Vec::len)
            .collect()
    }
}

fn parse_token(token: &PageToken) -> Option<(u64, usize)> {
    let (snapshot, offset) = token.as_str().split_once(':')?;
    Some((snapshot.parse().ok()?, offset.parse().ok()?))
}

#[async_trait::async_trait]
impl ChatConnection for MockChatConnection {
    async fn search(
        &self,
        chat: &ChatRef,
        author: Option<&UserId>,
        page_token: Option<&PageToken>,
        limit: usize,
    ) -> Result<SearchPage, ChatError> {
        let mut inner = self.inner.lock().unwrap();
        inner.search_limits.push(limit);

        if inner.unavailable.contains(chat) {
            return Err(ChatError::unavailable("chat unavailable"));
        }

        if inner.throttled_searches > 0 {
            inner.throttled_searches -= 1;
            return Err(ChatError::Throttled {
                retry_after: inner.retry_after,
            });
        }

        let (snapshot, offset) = match page_token {
            None => {
                let messages = inner.chats.get(chat).cloned().unwrap_or_default();
                let filter = author.filter(|_| !inner.ignore_author_filter);
                let filtered: Vec<MessageRef> = messages
                    .into_iter()
                    .filter(|message| filter.is_none_or(|author| &message.author == author))
                    .collect();

                let snapshot = inner.next_snapshot;
                inner.next_snapshot += 1;
                inner.snapshots.insert(snapshot, filtered);
                (snapshot, 0)
            }
            Some(token) => parse_token(token)
                .ok_or_else(|| ChatError::unavailable("malformed page token"))?,
        };

        let messages = inner
            .snapshots
            .get(&snapshot)
            .ok_or_else(|| ChatError::unavailable("unknown page token"))?;

        let end = messages.len().min(offset + limit);
        let page = messages[offset.min(messages.len())..end].to_vec();
        let next_page_token = (end < messages.len())
            .then(|| PageToken::new(format!("{snapshot}:{end}")));

        Ok(SearchPage {
            messages: page,
            next_page_token,
        })
    }

    async fn delete(
        &self,
        chat: &ChatRef,
        ids: &[MessageId],
    ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError> {
        let mut inner = self.inner.lock().unwrap();
        inner.delete_batches.push(ids.to_vec());

        if inner.unavailable.contains(chat) {
            return Err(ChatError::unavailable("chat unavailable"));
        }

        if inner.throttled_deletes > 0 {
            inner.throttled_deletes -= 1;
            return Err(ChatError::Throttled {
                retry_after: inner.retry_after,
            });
        }

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            if inner.denied.contains(id) {
                outcomes.push((id.clone(), DeleteOutcome::Denied));
                continue;
            }

            if let Some(remaining) = inner.throttled_ids.get_mut(id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    outcomes.push((id.clone(), DeleteOutcome::Throttled));
                    continue;
                }
            }

            let messages = inner.chats.entry(chat.clone()).or_default();
            let before = messages.len();
            messages.retain(|message| &message.id != id);
            let outcome = if messages.len() < before {
                DeleteOutcome::Deleted
            } else {
                DeleteOutcome::NotFound
            };
            outcomes.push((id.clone(), outcome));
        }

        Ok(outcomes)
    }
}
