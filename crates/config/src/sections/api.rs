// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use rand::{
    Rng,
    distributions::{Alphanumeric, DistString},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigurationSection;

fn default_endpoint() -> Url {
    Url::parse("http://localhost:8010/").unwrap()
}

/// Configuration related to the chat service's API
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiConfig {
    /// The base URL of the service's API
    #[serde(default = "default_endpoint")]
    pub endpoint: Url,

    /// Bearer token used to authenticate calls. Establishing a session is
    /// out of scope: the token has to be obtained out of band.
    pub access_token: String,
}

impl ConfigurationSection for ApiConfig {
    const PATH: Option<&'static str> = Some("api");
}

impl ApiConfig {
    pub(crate) fn generate<R>(mut rng: R) -> Self
    where
        R: Rng + Send,
    {
        Self {
            endpoint: default_endpoint(),
            access_token: Alphanumeric.sample_string(&mut rng, 32),
        }
    }

    pub(crate) fn test() -> Self {
        Self {
            endpoint: default_endpoint(),
            access_token: "test".to_owned(),
        }
    }
}
