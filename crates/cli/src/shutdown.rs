// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use tokio::signal::unix::{Signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// A helper to turn SIGTERM and SIGINT into a graceful cancellation.
///
/// The first signal cancels the token: the sweep stops putting calls on the
/// wire, accounts for whatever was in flight and still returns its report. A
/// second signal aborts the process outright.
pub struct ShutdownManager {
    cancellation_token: CancellationToken,
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownManager {
    /// Create a new shutdown manager, installing the signal handlers
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler could not be installed
    pub fn new() -> Result<Self, std::io::Error> {
        let cancellation_token = CancellationToken::new();
        let sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
        let sigint = tokio::signal::unix::signal(SignalKind::interrupt())?;

        Ok(Self {
            cancellation_token,
            sigterm,
            sigint,
        })
    }

    /// Get a cancellation token that is cancelled on the first signal
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Listen for shutdown signals until the process ends.
    pub async fn run(mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Shutdown signal received (SIGTERM), cancelling the run");
            },
            _ = self.sigint.recv() => {
                tracing::info!("Shutdown signal received (SIGINT), cancelling the run");
            },
        };

        self.cancellation_token.cancel();

        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::warn!("Second shutdown signal received (SIGTERM), abort");
            },
            _ = self.sigint.recv() => {
                tracing::warn!("Second shutdown signal received (SIGINT), abort");
            },
        }

        std::process::exit(2);
    }
}
