// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigurationSection;

fn default_interval_ms() -> u64 {
    1000
}

fn default_backoff_ms() -> u64 {
    60_000
}

/// Configuration of the outbound call pacing, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PacingConfig {
    /// Minimum delay between two search calls
    #[serde(default = "default_interval_ms")]
    pub search_interval_ms: u64,

    /// Minimum delay between two delete calls
    #[serde(default = "default_interval_ms")]
    pub delete_interval_ms: u64,

    /// Upper bound on the backoff applied after repeated throttling
    #[serde(default = "default_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How long without a throttling signal before the backoff resets to
    /// baseline
    #[serde(default = "default_backoff_ms")]
    pub reset_after_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            search_interval_ms: default_interval_ms(),
            delete_interval_ms: default_interval_ms(),
            max_backoff_ms: default_backoff_ms(),
            reset_after_ms: default_backoff_ms(),
        }
    }
}

impl ConfigurationSection for PacingConfig {
    const PATH: Option<&'static str> = Some("pacing");
}

impl PacingConfig {
    /// Returns true if the configuration is the default one
    pub(crate) fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment, Jail,
        providers::{Format, Yaml},
    };

    use super::*;

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    pacing:
                      search_interval_ms: 250
                      max_backoff_ms: 30000
                ",
            )?;

            let config = Figment::new()
                .merge(Yaml::file("config.yaml"))
                .extract_inner::<PacingConfig>("pacing")?;

            assert_eq!(config.search_interval_ms, 250);
            assert_eq!(config.delete_interval_ms, 1000);
            assert_eq!(config.max_backoff_ms, 30_000);
            assert_eq!(config.reset_after_ms, 60_000);

            Ok(())
        });
    }
}
