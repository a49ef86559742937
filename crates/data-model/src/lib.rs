// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

#![allow(clippy::module_name_repetitions)]

//! Domain types shared by every crate: identifiers handed out by the chat
//! service, search pages, per-id delete outcomes and the run report.

pub mod clock;
pub(crate) mod ids;
pub(crate) mod page;
pub(crate) mod report;

pub use self::{
    clock::{Clock, MockClock, SystemClock},
    ids::{ChatRef, MessageId, PageToken, UserId},
    page::{DeleteOutcome, MessageRef, SearchPage},
    report::{ChatReport, Failure, RunReport},
};
