// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{process::ExitCode, time::Duration};

use anyhow::Context;
use clap::Parser;
use csw_chat::{ChatConnection, ReadOnlyChatConnection};
use csw_chat_http::HttpChatConnection;
use csw_config::{ConfigurationSection, RootConfig};
use csw_data_model::{ChatRef, RunReport, SystemClock, UserId};
use csw_engine::{Cleaner, CleanerOptions, PacingOptions};
use figment::Figment;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::shutdown::ShutdownManager;

#[derive(Parser, Debug)]
pub(super) struct Options {
    /// Search and report, but do not delete anything
    #[clap(long)]
    dry_run: bool,
}

impl Options {
    pub async fn run(self, figment: &Figment) -> anyhow::Result<ExitCode> {
        let config = RootConfig::extract(figment).map_err(anyhow::Error::from_boxed)?;

        let pacing = PacingOptions {
            search_interval: Duration::from_millis(config.pacing.search_interval_ms),
            delete_interval: Duration::from_millis(config.pacing.delete_interval_ms),
            max_backoff: Duration::from_millis(config.pacing.max_backoff_ms),
            reset_after: Duration::from_millis(config.pacing.reset_after_ms),
        };
        let chats: Vec<ChatRef> = config.chats.iter().map(ChatRef::from).collect();
        let options = CleanerOptions::new(chats, UserId::from(config.account.acting_user_id))
            .with_search_chunk_size(config.limits.search_chunk_size)
            .with_delete_chunk_size(config.limits.delete_chunk_size)
            .with_max_attempts(config.limits.max_attempts)
            .with_pacing(pacing);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build the HTTP client")?;
        let connection = HttpChatConnection::new(
            config.api.endpoint.clone(),
            config.api.access_token.clone(),
            http_client,
        );

        let report = if self.dry_run {
            info!("Dry-run: deletions will not reach the service");
            sweep(ReadOnlyChatConnection::new(connection), options).await?
        } else {
            sweep(connection, options).await?
        };

        // The report goes on stdout, logs go on stderr
        let yaml = serde_yaml::to_string(&report)?;
        tokio::io::stdout().write_all(yaml.as_bytes()).await?;

        Ok(if report.is_degraded() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    }
}

async fn sweep<C: ChatConnection>(
    connection: C,
    options: CleanerOptions,
) -> anyhow::Result<RunReport> {
    let shutdown = ShutdownManager::new().context("Failed to install the signal handlers")?;
    let cleaner = Cleaner::new(connection, options);

    // The first signal cancels the run, which still returns its report
    let shutdown_token = shutdown.cancellation_token();
    let run_token = cleaner.cancellation_token();
    tokio::spawn(async move {
        shutdown_token.cancelled().await;
        run_token.cancel();
    });
    tokio::spawn(shutdown.run());

    let clock = SystemClock::default();
    Ok(cleaner.run(&clock).await)
}
