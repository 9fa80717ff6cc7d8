//! Named stage slots and the middleware contract.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{ApiResponse, RequestContext, RequestHandlerError};

/// The six slots collaborators can hook into, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    PreAuthentication,
    PostAuthentication,
    PreAuthorization,
    PostAuthorization,
    PreRequest,
    PostRequest,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::PreAuthentication,
        Stage::PostAuthentication,
        Stage::PreAuthorization,
        Stage::PostAuthorization,
        Stage::PreRequest,
        Stage::PostRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreAuthentication => "preauthentication",
            Stage::PostAuthentication => "postauthentication",
            Stage::PreAuthorization => "preauthorization",
            Stage::PostAuthorization => "postauthorization",
            Stage::PreRequest => "prerequest",
            Stage::PostRequest => "postrequest",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the pipeline does after a middleware returns.
#[derive(Debug)]
pub enum Flow {
    /// Continue with the next stage.
    Next,
    /// Stop here and answer with this response.
    Respond(ApiResponse),
}

/// A request-processing step.
///
/// Closures of the shape `Fn(&mut RequestContext) -> Result<Flow, RequestHandlerError>`
/// implement this trait directly.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError>;
}

#[async_trait]
impl<F> Middleware for F
where
    F: Fn(&mut RequestContext) -> Result<Flow, RequestHandlerError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        self(ctx)
    }
}

pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Middleware registered by collaborators before start, per slot.
#[derive(Clone, Default)]
pub struct StageRegistry {
    slots: BTreeMap<Stage, Vec<BoxedMiddleware>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to a slot. Order within a slot is insertion order.
    pub fn register(&mut self, stage: Stage, middleware: BoxedMiddleware) {
        self.slots.entry(stage).or_default().push(middleware);
    }

    pub fn handlers(&self, stage: Stage) -> &[BoxedMiddleware] {
        self.slots.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|(stage, handlers)| (stage.as_str(), handlers.len())))
            .finish()
    }
}
