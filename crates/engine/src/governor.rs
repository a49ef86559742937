// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Outbound call pacing.
//!
//! The [`RateGovernor`] is the only component allowed to introduce
//! artificial delay: everything else treats [`RateGovernor::pace`] as an
//! opaque suspension point. Search and delete traffic are paced
//! independently, since they hit different remote limits, but one governor
//! instance must be shared per account: the service's flood-control budget
//! is account-wide, not per-chat.

use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

/// The two kinds of outbound calls, paced independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// History search calls
    Search,

    /// Batch delete calls
    Delete,
}

/// Pacing policy knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingOptions {
    /// Minimum delay between two search calls
    pub search_interval: Duration,

    /// Minimum delay between two delete calls
    pub delete_interval: Duration,

    /// Upper bound on the exponential backoff applied after repeated
    /// throttling
    pub max_backoff: Duration,

    /// How long without a throttling signal before the backoff level resets
    /// to baseline
    pub reset_after: Duration,
}

impl Default for PacingOptions {
    fn default() -> Self {
        Self {
            search_interval: Duration::from_secs(1),
            delete_interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            reset_after: Duration::from_secs(60),
        }
    }
}

struct ClassState {
    min_interval: Duration,
    current_interval: Duration,
    next_allowed: Instant,
    consecutive_throttles: u32,
    last_throttle: Option<Instant>,
}

impl ClassState {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            current_interval: min_interval,
            next_allowed: Instant::now(),
            consecutive_throttles: 0,
            last_throttle: None,
        }
    }
}

/// Paces outbound calls to respect the remote service's flood control
pub struct RateGovernor {
    max_backoff: Duration,
    reset_after: Duration,
    search: Mutex<ClassState>,
    delete: Mutex<ClassState>,
}

impl RateGovernor {
    /// Create a governor with the given pacing policy
    #[must_use]
    pub fn new(options: &PacingOptions) -> Self {
        Self {
            max_backoff: options.max_backoff,
            reset_after: options.reset_after,
            search: Mutex::new(ClassState::new(options.search_interval)),
            delete: Mutex::new(ClassState::new(options.delete_interval)),
        }
    }

    fn state(&self, class: OperationClass) -> &Mutex<ClassState> {
        match class {
            OperationClass::Search => &self.search,
            OperationClass::Delete => &self.delete,
        }
    }

    /// Suspend the caller until the next call of the given class is allowed,
    /// and reserve the slot.
    pub async fn pace(&self, class: OperationClass) {
        let wait = {
            let mut state = self.state(class).lock().await;
            let now = Instant::now();

            // After a sustained period without throttling, go back to the
            // baseline interval
            if state.consecutive_throttles > 0
                && state
                    .last_throttle
                    .is_none_or(|at| now.duration_since(at) >= self.reset_after)
            {
                state.consecutive_throttles = 0;
                state.current_interval = state.min_interval;
            }

            let wait = state.next_allowed.saturating_duration_since(now);
            state.next_allowed = state.next_allowed.max(now) + state.current_interval;
            wait
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a throttling signal for the given class.
    ///
    /// The remote-suggested delay is applied when present, otherwise an
    /// exponential backoff with a cap. Returns the delay before the next
    /// call of that class is allowed.
    pub async fn on_throttled(
        &self,
        class: OperationClass,
        suggested: Option<Duration>,
    ) -> Duration {
        let mut state = self.state(class).lock().await;
        let now = Instant::now();

        state.consecutive_throttles = state.consecutive_throttles.saturating_add(1);
        state.last_throttle = Some(now);

        let backoff = suggested.unwrap_or_else(|| {
            state
                .min_interval
                .saturating_mul(2u32.saturating_pow(state.consecutive_throttles))
        });
        let cap = self.max_backoff.max(state.min_interval);
        let backoff = backoff.clamp(state.min_interval, cap);

        // Keep calls of this class slowed down until the quiet period
        // expires
        state.current_interval = backoff;
        state.next_allowed = now + backoff;

        tracing::debug!(
            ?class,
            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
            consecutive = state.consecutive_throttles,
            "Throttled by the chat service, backing off",
        );

        backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    fn governor() -> RateGovernor {
        RateGovernor::new(&PacingOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn paces_calls_at_the_minimum_interval() {
        let governor = governor();
        let start = Instant::now();

        governor.pace(OperationClass::Search).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        governor.pace(OperationClass::Search).await;
        assert_eq!(start.elapsed(), SECOND);

        governor.pace(OperationClass::Search).await;
        assert_eq!(start.elapsed(), 2 * SECOND);
    }

    #[tokio::test(start_paused = true)]
    async fn classes_are_paced_independently() {
        let governor = governor();
        let start = Instant::now();

        governor.pace(OperationClass::Search).await;
        governor.pace(OperationClass::Delete).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn honours_the_suggested_delay() {
        let governor = governor();

        governor.pace(OperationClass::Delete).await;
        let applied = governor
            .on_throttled(OperationClass::Delete, Some(Duration::from_secs(17)))
            .await;
        assert_eq!(applied, Duration::from_secs(17));

        let start = Instant::now();
        governor.pace(OperationClass::Delete).await;
        assert_eq!(start.elapsed(), Duration::from_secs(17));
    }

    #[tokio::test(start_paused = true)]
    async fn backs_off_exponentially_with_a_cap() {
        let governor = governor();

        let first = governor.on_throttled(OperationClass::Search, None).await;
        let second = governor.on_throttled(OperationClass::Search, None).await;
        let third = governor.on_throttled(OperationClass::Search, None).await;
        assert_eq!(first, 2 * SECOND);
        assert_eq!(second, 4 * SECOND);
        assert_eq!(third, 8 * SECOND);

        // Enough consecutive throttles hit the cap
        for _ in 0..10 {
            governor.on_throttled(OperationClass::Search, None).await;
        }
        let capped = governor.on_throttled(OperationClass::Search, None).await;
        assert_eq!(capped, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn resets_to_baseline_after_a_quiet_period() {
        let governor = governor();

        governor.on_throttled(OperationClass::Search, None).await;
        governor.pace(OperationClass::Search).await;

        // The next pace is still at the backed-off interval
        let start = Instant::now();
        governor.pace(OperationClass::Search).await;
        assert_eq!(start.elapsed(), 2 * SECOND);

        // Quiet for longer than the reset period
        tokio::time::advance(Duration::from_secs(61)).await;

        governor.pace(OperationClass::Search).await;
        let start = Instant::now();
        governor.pace(OperationClass::Search).await;
        assert_eq!(start.elapsed(), SECOND);
    }
}
