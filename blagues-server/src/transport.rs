//! Presenter backed by the chat transport's HTTP bridge.
//!
//! The bridge owns the chat connection. This side only sends presentation
//! intents:
//!
//! - `POST {base}/boards/{board}/messages` publishes a proposal
//! - `POST {base}/conversations/{conversation}/messages` replies to a user
//! - `PUT {base}/messages/{ref}` replaces a message's content
//! - `GET {base}/messages/{ref}` checks that a message still exists
//!
//! Every body is a `DisplayPayload` as JSON; creation answers with
//! `{"external_ref": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

use blagues_core::presentation::{Board, Conversation, DisplayPayload, Presenter, TransportError};
use blagues_core::ExternalRef;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Created {
    external_ref: ExternalRef,
}

#[derive(Clone)]
pub struct HttpPresenter {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPresenter {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| {
                error!(operation, error = %e, "transport request failed");
                TransportError::Request(e.to_string())
            })?;
        debug!(operation, status = %response.status(), "transport answered");
        Ok(response)
    }

    async fn create(&self, operation: &str, path: String, payload: &DisplayPayload) -> Result<ExternalRef, TransportError> {
        let response = self
            .send(operation, self.client.post(self.url(&path)).json(payload))
            .await?;
        let response = check(response).await?;
        let created: Created = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok(created.external_ref)
    }
}

/// Turn a non-success status into `Rejected`, keeping the body for the log.
async fn check(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %body, "transport rejected the request");
    Err(TransportError::Rejected {
        status: status.as_u16(),
        body,
    })
}

fn board_path(board: Board) -> &'static str {
    match board {
        Board::Suggestions => "suggestions",
        Board::Corrections => "corrections",
    }
}

#[async_trait]
impl Presenter for HttpPresenter {
    async fn publish(&self, board: Board, payload: DisplayPayload) -> Result<ExternalRef, TransportError> {
        self.create(
            "publish",
            format!("boards/{}/messages", board_path(board)),
            &payload,
        )
        .await
    }

    async fn reply(
        &self,
        conversation: &Conversation,
        payload: DisplayPayload,
    ) -> Result<ExternalRef, TransportError> {
        self.create(
            "reply",
            format!("conversations/{}/messages", conversation),
            &payload,
        )
        .await
    }

    async fn edit(&self, target: &ExternalRef, payload: DisplayPayload) -> Result<(), TransportError> {
        let response = self
            .send(
                "edit",
                self.client
                    .put(self.url(&format!("messages/{}", target)))
                    .json(&payload),
            )
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn exists(&self, target: &ExternalRef) -> Result<bool, TransportError> {
        let response = self
            .send(
                "exists",
                self.client.get(self.url(&format!("messages/{}", target))),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }
}
