// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, PageToken, UserId};

/// A single search hit: a message identifier along with its author.
///
/// The author is carried on every hit so that callers can enforce ownership
/// filtering themselves, without trusting the backend to have applied the
/// author filter server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// The message identifier
    pub id: MessageId,

    /// The account which authored the message
    pub author: UserId,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    /// The hits in this page, in service order
    pub messages: Vec<MessageRef>,

    /// Token to fetch the next page. [`None`] signals the end of history
    /// for this query.
    pub next_page_token: Option<PageToken>,
}

impl SearchPage {
    /// Whether this is the last page of the query
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }
}

/// Per-message outcome of a batched delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The message was deleted
    Deleted,

    /// The message was already gone. Counts as success.
    NotFound,

    /// The account is not authorized to delete this message. Fatal for this
    /// id; authorization will not change within a run.
    Denied,

    /// The service refused the deletion because of flood control. Retryable.
    Throttled,
}

impl DeleteOutcome {
    /// Whether the message is gone, one way or another
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Deleted | Self::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_success() {
        assert!(DeleteOutcome::Deleted.is_success());
        assert!(DeleteOutcome::NotFound.is_success());
        assert!(!DeleteOutcome::Denied.is_success());
        assert!(!DeleteOutcome::Throttled.is_success());
    }

    #[test]
    fn page_end_detection() {
        let page = SearchPage::default();
        assert!(page.is_last());

        let page = SearchPage {
            messages: Vec::new(),
            next_page_token: Some(PageToken::from("opaque")),
        };
        assert!(!page.is_last());
    }
}
