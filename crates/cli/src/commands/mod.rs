// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};

mod config;
mod sweep;

#[derive(Parser, Debug)]
enum Subcommand {
    /// Configuration-related commands
    Config(self::config::Options),

    /// Sweep the configured chats, deleting the acting account's messages
    Sweep(self::sweep::Options),
}

#[derive(Parser, Debug)]
#[command(name = "chatsweep", version)]
pub struct Options {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Append,
        env = "CSW_CONFIG"
    )]
    config: Vec<Utf8PathBuf>,

    #[command(subcommand)]
    subcommand: Subcommand,
}

impl Options {
    /// Assemble the configuration from the config files and the environment.
    ///
    /// Later config files override earlier ones, and `CSW_*` environment
    /// variables override everything (nested keys separated by `__`, e.g.
    /// `CSW_ACCOUNT__ACTING_USER_ID`).
    pub fn figment(&self) -> Figment {
        let configs: Vec<Utf8PathBuf> = if self.config.is_empty() {
            vec!["config.yaml".into()]
        } else {
            self.config.clone()
        };

        configs
            .iter()
            .fold(Figment::new(), |figment, path| {
                figment.merge(Yaml::file(path))
            })
            .merge(Env::prefixed("CSW_").split("__"))
    }

    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        match self.subcommand {
            Subcommand::Config(c) => Box::pin(c.run(figment)).await,
            Subcommand::Sweep(c) => Box::pin(c.run(figment)).await,
        }
    }
}
