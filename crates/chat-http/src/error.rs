// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::{fmt::Display, time::Duration};

use async_trait::async_trait;
use csw_chat::ChatError;
use http::StatusCode;
use serde::Deserialize;

/// The error body the service attaches to non-2xx responses, when it does
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    errcode: String,
    error: String,
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.errcode, self.error)
    }
}

fn parse_retry_after(headers: &http::HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?;
    let seconds: u64 = value.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(seconds))
}

/// An extension trait for [`reqwest::Response`] which lifts the service's
/// error responses into a [`ChatError`].
///
/// HTTP 429 becomes [`ChatError::Throttled`], with the `Retry-After` header
/// parsed when present. Every other non-2xx status becomes
/// [`ChatError::Unavailable`], carrying the service's error body when it
/// sent one.
#[async_trait]
pub(crate) trait ApiResponseExt: Sized {
    async fn error_for_api_error(self) -> Result<Self, ChatError>;
}

#[async_trait]
impl ApiResponseExt for reqwest::Response {
    async fn error_for_api_error(self) -> Result<Self, ChatError> {
        match self.error_for_status_ref() {
            Ok(_response) => Ok(self),
            Err(source) => {
                if self.status() == StatusCode::TOO_MANY_REQUESTS {
                    return Err(ChatError::Throttled {
                        retry_after: parse_retry_after(self.headers()),
                    });
                }

                let status = self.status();
                let api_error: Option<ApiError> = self.json().await.ok();
                let reason = match api_error {
                    Some(api_error) => api_error.to_string(),
                    None => format!("unexpected HTTP status {status}"),
                };

                Err(ChatError::Unavailable {
                    reason,
                    source: Some(Box::new(source)),
                })
            }
        }
    }
}
