// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigurationSection;

/// Configuration related to the acting account
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AccountConfig {
    /// The identifier of the account whose messages are swept. Only messages
    /// authored by this account are ever deleted.
    pub acting_user_id: String,
}

impl ConfigurationSection for AccountConfig {
    const PATH: Option<&'static str> = Some("account");

    fn validate(
        &self,
        _figment: &figment::Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        if self.acting_user_id.is_empty() {
            return Err("account.acting_user_id must not be empty".into());
        }

        Ok(())
    }
}

impl AccountConfig {
    pub(crate) fn generate() -> Self {
        Self {
            acting_user_id: "CHANGE ME".to_owned(),
        }
    }

    pub(crate) fn test() -> Self {
        Self {
            acting_user_id: "me".to_owned(),
        }
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
                    account:
                      acting_user_id: alice
                ",
            )?;

            let config = Figment::new()
                .merge(Yaml::file("config.yaml"))
                .extract_inner::<AccountConfig>("account")?;

            assert_eq!(&config.acting_user_id, "alice");

            Ok(())
        });
    }
}
