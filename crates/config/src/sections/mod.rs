// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod account;
mod api;
mod chats;
mod limits;
mod pacing;

pub use self::{
    account::AccountConfig, api::ApiConfig, chats::ChatsConfig, limits::LimitsConfig,
    pacing::PacingConfig,
};
use crate::util::ConfigurationSection;

/// Application configuration root
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RootConfig {
    /// Configuration related to the acting account
    pub account: AccountConfig,

    /// The chats to sweep, in processing order
    pub chats: ChatsConfig,

    /// Configuration related to the chat service's API
    pub api: ApiConfig,

    /// Chunk sizes and retry bound
    #[serde(default, skip_serializing_if = "LimitsConfig::is_default")]
    pub limits: LimitsConfig,

    /// Outbound call pacing
    #[serde(default, skip_serializing_if = "PacingConfig::is_default")]
    pub pacing: PacingConfig,
}

impl ConfigurationSection for RootConfig {
    fn validate(
        &self,
        figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        self.account.validate(figment)?;
        self.chats.validate(figment)?;
        self.api.validate(figment)?;
        self.limits.validate(figment)?;
        self.pacing.validate(figment)?;

        Ok(())
    }
}

impl RootConfig {
    /// Generate a new configuration with a placeholder account and a random
    /// access token
    pub fn generate<R>(mut rng: R) -> Self
    where
        R: Rng + Send,
    {
        Self {
            account: AccountConfig::generate(),
            chats: ChatsConfig::generate(),
            api: ApiConfig::generate(&mut rng),
            limits: LimitsConfig::default(),
            pacing: PacingConfig::default(),
        }
    }

    /// Configuration used in tests
    #[must_use]
    pub fn test() -> Self {
        Self {
            account: AccountConfig::test(),
            chats: ChatsConfig::test(),
            api: ApiConfig::test(),
            limits: LimitsConfig::default(),
            pacing: PacingConfig::default(),
        }
    }
}
