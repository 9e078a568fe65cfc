//! Health and status endpoints.
//!
//! `/status` summarises the proposals under review. It is disabled unless a
//! bearer token is configured.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use blagues_core::{Dataset, Proposal, ProposalFilter, ProposalRepository, ProposalStatus};

use crate::{get_bot_version, AppState};

/// Summary statistics for the status page.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StatusSummary {
    pub total_proposals: usize,
    pub pending_suggestions: usize,
    pub pending_corrections: usize,
    pub merged: usize,
    pub refused: usize,
}

/// A pending proposal, as listed on the status page.
#[derive(Debug, Serialize)]
pub struct PendingEntry {
    pub id: i64,
    pub kind: &'static str,
    pub external_ref: String,
    pub submitter: String,
    pub question: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct StatusData {
    pub version: String,
    pub quorum: usize,
    pub dataset_items: usize,
    pub summary: StatusSummary,
    pub pending: Vec<PendingEntry>,
}

impl StatusData {
    pub fn from_proposals(
        proposals: Vec<Proposal>,
        dataset_items: usize,
        quorum: usize,
        version: String,
    ) -> Self {
        let mut summary = StatusSummary {
            total_proposals: proposals.len(),
            ..Default::default()
        };
        let mut pending = Vec::new();

        for proposal in proposals {
            match proposal.status() {
                ProposalStatus::Merged => summary.merged += 1,
                ProposalStatus::Refused => summary.refused += 1,
                ProposalStatus::Pending => {
                    if proposal.kind.is_suggestion() {
                        summary.pending_suggestions += 1;
                    } else {
                        summary.pending_corrections += 1;
                    }
                    pending.push(PendingEntry {
                        id: proposal.id.0,
                        kind: proposal.kind.noun(),
                        external_ref: proposal.external_ref.0,
                        submitter: proposal.submitter.0,
                        question: proposal.payload.question,
                        created_at: proposal.created_at.to_rfc3339(),
                    });
                }
            }
        }

        Self {
            version,
            quorum,
            dataset_items,
            summary,
            pending,
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "blagues"
    }))
}

fn validate_auth(headers: &HeaderMap, auth_token: &Option<String>) -> Result<(), Response> {
    let Some(expected_token) = auth_token else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Status is disabled (STATUS_AUTH_TOKEN not configured)",
        )
            .into_response());
    };

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header.and_then(|value| value.strip_prefix("Bearer ")) {
        Some(provided) if provided == expected_token => Ok(()),
        Some(_) => Err((StatusCode::UNAUTHORIZED, "Invalid token").into_response()),
        None => Err((
            StatusCode::UNAUTHORIZED,
            "Missing or malformed Authorization header. Expected: Bearer <token>",
        )
            .into_response()),
    }
}

async fn status_handler(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    if let Err(response) = validate_auth(&headers, &state.config.status_auth_token) {
        return response;
    }

    let proposals = match state.repo.list_proposals(ProposalFilter::default()).await {
        Ok(proposals) => proposals,
        Err(e) => {
            error!(error = %e, "failed to list proposals for status");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let dataset_items = match state.dataset.count().await {
        Ok(count) => count,
        Err(e) => {
            error!(error = %e, "failed to count dataset items for status");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    Json(StatusData::from_proposals(
        proposals,
        dataset_items,
        state.flow.settings().quorum,
        get_bot_version().to_string(),
    ))
    .into_response()
}

pub fn status_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_handler))
}
