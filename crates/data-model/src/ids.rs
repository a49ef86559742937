// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Opaque identifiers handed out by the chat service.
//!
//! All of those are plain strings from the engine's point of view: it only
//! ever compares, hashes and echoes them back to the service. In particular,
//! [`MessageId`]s carry no ordering guarantee, and [`PageToken`]s are only
//! meaningful to the service which minted them.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier from the service.
            pub fn new(inner: impl Into<String>) -> Self {
                Self(inner.into())
            }

            /// The raw identifier, as the service knows it.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(inner: String) -> Self {
                Self(inner)
            }
        }

        impl From<&str> for $name {
            fn from(inner: &str) -> Self {
                Self(inner.to_owned())
            }
        }
    };
}

opaque_id!(
    /// Reference to a conversation on the chat service.
    ChatRef
);

opaque_id!(
    /// Identifier of an account on the chat service.
    UserId
);

opaque_id!(
    /// Identifier of a single message, unique within its [`ChatRef`].
    MessageId
);

opaque_id!(
    /// Continuation token for a paginated search query.
    PageToken
);
