// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigurationSection;

fn default_search_chunk_size() -> usize {
    100
}

fn default_delete_chunk_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    5
}

/// Configuration of the chunk sizes and the retry bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LimitsConfig {
    /// How many hits to request per search call
    #[serde(default = "default_search_chunk_size")]
    pub search_chunk_size: usize,

    /// How many message ids go into a single delete call
    #[serde(default = "default_delete_chunk_size")]
    pub delete_chunk_size: usize,

    /// How many times a throttled call or message is attempted before giving
    /// up on it
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            search_chunk_size: default_search_chunk_size(),
            delete_chunk_size: default_delete_chunk_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ConfigurationSection for LimitsConfig {
    const PATH: Option<&'static str> = Some("limits");

    fn validate(
        &self,
        _figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        if self.search_chunk_size == 0 {
            return Err("limits.search_chunk_size must be positive".into());
        }

        if self.delete_chunk_size == 0 {
            return Err("limits.delete_chunk_size must be positive".into());
        }

        if self.max_attempts == 0 {
            return Err("limits.max_attempts must be positive".into());
        }

        Ok(())
    }
}

impl LimitsConfig {
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
                    limits:
                      search_chunk_size: 25
                ",
            )?;

            let config = Figment::new()
                .merge(Yaml::file("config.yaml"))
                .extract_inner::<LimitsConfig>("limits")?;

            assert_eq!(config.search_chunk_size, 25);
            // Unset fields keep their defaults
            assert_eq!(config.delete_chunk_size, 10);
            assert_eq!(config.max_attempts, 5);

            Ok(())
        });
    }

    #[test]
    fn zero_chunk_sizes_do_not_validate() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    limits:
                      delete_chunk_size: 0
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = figment.extract_inner::<LimitsConfig>("limits")?;
            assert!(config.validate(&figment).is_err());

            Ok(())
        });
    }
}
