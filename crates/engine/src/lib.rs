// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! The deletion engine.
//!
//! [`Cleaner`] drives, for each configured chat, a [`MessageSource`] which
//! paginates through the chat's history and a [`DeleteBatcher`] which groups
//! the self-authored message ids into bounded delete calls. All outbound
//! traffic, search and delete alike, is paced through a single shared
//! [`RateGovernor`] so the account stays under the service's flood-control
//! thresholds.

#![allow(clippy::module_name_repetitions)]

mod batcher;
mod cleaner;
mod governor;
mod source;

pub use self::{
    batcher::{BatchError, BatcherOptions, DeleteBatcher},
    cleaner::{Cleaner, CleanerOptions},
    governor::{OperationClass, PacingOptions, RateGovernor},
    source::{MessageSource, SourceError, SourceOptions},
};
