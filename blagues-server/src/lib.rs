pub mod api;
pub mod config;
pub mod dataset_file;
pub mod repository;
pub mod status;
pub mod transport;
pub mod webhook;

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use blagues_core::{Dataset, ProposalRepository, SubmissionFlow};

use crate::config::Config;

pub fn get_bot_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct AppState {
    pub config: Config,
    pub flow: SubmissionFlow,
    pub repo: Arc<dyn ProposalRepository>,
    pub dataset: Arc<dyn Dataset>,
}

/// Every HTTP route of the server, with request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status::status_router())
        .merge(api::api_router())
        .merge(webhook::webhook_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
