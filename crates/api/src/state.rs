use std::sync::Arc;

use ctlens_compressor::api::CompressorApi;
use ctlens_pipeline::orchestrator::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Job tracking: pollers, analysis sessions, stored results.
    pub orchestrator: Arc<Orchestrator>,
    /// Compression service client, used for health probes.
    pub compressor: Arc<CompressorApi>,
}
