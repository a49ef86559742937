// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigurationSection;

/// The list of chats to sweep, in processing order
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ChatsConfig(Vec<String>);

impl ConfigurationSection for ChatsConfig {
    const PATH: Option<&'static str> = Some("chats");

    fn validate(
        &self,
        _figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        if self.0.is_empty() {
            return Err("chats must list at least one chat".into());
        }

        if self.0.iter().any(String::is_empty) {
            return Err("chats must not contain empty identifiers".into());
        }

        Ok(())
    }
}

impl ChatsConfig {
    /// Iterate over the configured chat identifiers, in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub(crate) fn generate() -> Self {
        Self(vec!["CHANGE ME".to_owned()])
    }

    pub(crate) fn test() -> Self {
        Self(vec!["chat-1".to_owned()])
    }
}
