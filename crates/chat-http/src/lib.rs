// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! A [`ChatConnection`] talking to the chat service's JSON HTTP API.

mod error;

use csw_chat::{ChatConnection, ChatError};
use csw_data_model::{ChatRef, DeleteOutcome, MessageId, PageToken, SearchPage, UserId};
use http::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApiResponseExt as _;

/// A [`ChatConnection`] backed by the service's HTTP API.
///
/// All calls are authenticated with the configured bearer token. The
/// connection is cheap to clone; clones share the underlying client's
/// connection pool.
#[derive(Clone)]
pub struct HttpChatConnection {
    endpoint: Url,
    access_token: String,
    http_client: reqwest::Client,
}

impl HttpChatConnection {
    #[must_use]
    pub fn new(endpoint: Url, access_token: String, http_client: reqwest::Client) -> Self {
        Self {
            endpoint,
            access_token,
            http_client,
        }
    }

    fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, ChatError> {
        // Url::join treats a base path without a trailing slash as a file
        // and replaces its last segment, so the endpoint should end with one
        let url = self
            .endpoint
            .join(url)
            .map_err(|err| ChatError::Unavailable {
                reason: format!("invalid API endpoint: {err}"),
                source: Some(Box::new(err)),
            })?;

        Ok(self
            .http_client
            .request(Method::POST, String::from(url))
            .bearer_auth(&self.access_token))
    }
}

fn transport_error(reason: &'static str, source: reqwest::Error) -> ChatError {
    ChatError::Unavailable {
        reason: reason.to_owned(),
        source: Some(Box::new(source)),
    }
}

#[async_trait::async_trait]
impl ChatConnection for HttpChatConnection {
    #[tracing::instrument(
        name = "chat.search",
        skip_all,
        fields(
            chat.ref = %chat,
            search.limit = limit,
        ),
        err(Debug),
    )]
    async fn search(
        &self,
        chat: &ChatRef,
        author: Option<&UserId>,
        page_token: Option<&PageToken>,
        limit: usize,
    ) -> Result<SearchPage, ChatError> {
        #[derive(Serialize)]
        struct Request<'a> {
            chat: &'a ChatRef,
            #[serde(skip_serializing_if = "Option::is_none")]
            author: Option<&'a UserId>,
            #[serde(skip_serializing_if = "Option::is_none")]
            page_token: Option<&'a PageToken>,
            limit: usize,
        }

        let response = self
            .post("v1/messages/search")?
            .json(&Request {
                chat,
                author,
                page_token,
                limit,
            })
            .send()
            .await
            .map_err(|err| transport_error("failed to reach the chat service", err))?;

        let response = response.error_for_api_error().await?;

        let page: SearchPage = response.json().await.map_err(|err| {
            transport_error("failed to deserialize search response", err)
        })?;

        Ok(page)
    }

    #[tracing::instrument(
        name = "chat.delete",
        skip_all,
        fields(
            chat.ref = %chat,
            delete.count = ids.len(),
        ),
        err(Debug),
    )]
    async fn delete(
        &self,
        chat: &ChatRef,
        ids: &[MessageId],
    ) -> Result<Vec<(MessageId, DeleteOutcome)>, ChatError> {
        #[derive(Serialize)]
        struct Request<'a> {
            chat: &'a ChatRef,
            ids: &'a [MessageId],
        }

        #[derive(Deserialize)]
        struct Response {
            outcomes: Vec<Outcome>,
        }

        #[derive(Deserialize)]
        struct Outcome {
            id: MessageId,
            outcome: DeleteOutcome,
        }

        let response = self
            .post("v1/messages/delete")?
            .json(&Request { chat, ids })
            .send()
            .await
            .map_err(|err| transport_error("failed to reach the chat service", err))?;

        let response = response.error_for_api_error().await?;

        let body: Response = response.json().await.map_err(|err| {
            transport_error("failed to deserialize delete response", err)
        })?;

        Ok(body
            .outcomes
            .into_iter()
            .map(|outcome| (outcome.id, outcome.outcome))
            .collect())
    }
}
