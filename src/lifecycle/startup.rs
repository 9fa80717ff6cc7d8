//! Startup orchestration.
//!
//! # Responsibilities
//! - Derive the listener options from configuration
//! - Install the pipeline stages in their fixed order
//! - Generate the route table
//!
//! # Design Decisions
//! - Fail fast: any startup error aborts the sequence
//! - Steps run in order, never concurrently
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::{ServerConfig, TlsConfig};
use crate::events::EventHub;
use crate::http::format::{Formatters, ResponseTimeFormatter};
use crate::http::server::Dispatcher;
use crate::lifecycle::shutdown::InFlightTracker;
use crate::lifecycle::state::LifecycleError;
use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;
use crate::pipeline::builtin::{
    self, AcceptParser, AuthorizationParser, BodyNormalizer, BodyParser, DateParser, QueryParser,
};
use crate::pipeline::{Pipeline, Stage, StageRegistry};
use crate::routing::{RouteDefinition, Router};

/// Why `start()` failed.
#[derive(Debug, Error)]
pub enum ServerStartError {
    #[error(transparent)]
    Bind(#[from] ListenerError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("server failed while starting: {0}")]
    Serve(#[source] std::io::Error),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Options handed to the HTTP layer.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub name: String,
    pub default_version: String,
    pub response_time_header: HeaderName,
    pub response_time_formatter: Option<ResponseTimeFormatter>,
    pub formatters: Formatters,
    pub tls: Option<TlsConfig>,
}

impl ListenerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            name: config.name.clone(),
            default_version: config.default_version.clone(),
            response_time_header: config.response_time_header.clone(),
            response_time_formatter: config.response_time_formatter.clone(),
            formatters: config.formatters.clone(),
            tls: config.tls().cloned(),
        }
    }
}

/// Install the pipeline and generate routes, in start-sequence order.
///
/// Routing outcomes and request completion are bridged to `hub` by the
/// returned dispatcher.
pub fn assemble(
    config: &ServerConfig,
    options: &ListenerOptions,
    stages: &StageRegistry,
    routes: Vec<RouteDefinition>,
    hub: &EventHub,
    tracker: InFlightTracker,
) -> Dispatcher {
    let pipeline = Pipeline::builder()
        .builtin(builtin::ACCEPT, Arc::new(AcceptParser::new(&options.formatters)))
        .install(Stage::PreAuthentication, stages)
        .install(Stage::PostAuthentication, stages)
        .builtin(builtin::AUTHORIZATION, Arc::new(AuthorizationParser))
        .install(Stage::PreAuthorization, stages)
        .install(Stage::PostAuthorization, stages)
        .builtin(builtin::DATE, Arc::new(DateParser::new(config.date_clock_skew)))
        .builtin(builtin::QUERY, Arc::new(QueryParser))
        .builtin(builtin::BODY, Arc::new(BodyParser::new(config.max_body_size)))
        .builtin(builtin::BODY_NORMALIZER, Arc::new(BodyNormalizer))
        .install(Stage::PreRequest, stages)
        .install(Stage::PostRequest, stages)
        .build();

    tracing::debug!(stages = ?pipeline.labels(), "Pipeline installed");

    let router = Router::generate(routes, &options.default_version, hub.clone());

    Dispatcher::new(options, pipeline, router, hub.clone(), tracker)
}
