//! Middleware pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! accept negotiation
//!   → preauthentication*  → postauthentication*
//!   → authorization parser
//!   → preauthorization*   → postauthorization*
//!   → date parser → query parser → body parser → body normalizer
//!   → prerequest*
//!   → [route dispatch]
//!   → postrequest*
//! ```
//! `*` marks collaborator slots; everything else is built in.
//!
//! # Design Decisions
//! - Slot order is fixed; order within a slot is insertion order
//! - Frozen at start: the pipeline is immutable while requests flow
//! - A stage ends the request early by returning `Flow::Respond`

pub mod builtin;
pub mod stage;

use std::fmt;

use crate::http::{RequestContext, RequestHandlerError};

pub use stage::{BoxedMiddleware, Flow, Middleware, Stage, StageRegistry};

/// Label of the route dispatch position in [`Pipeline::labels`].
pub const ROUTE_LABEL: &str = "route";

struct Entry {
    label: String,
    middleware: BoxedMiddleware,
}

/// The installed, immutable pipeline.
pub struct Pipeline {
    before_route: Vec<Entry>,
    after_route: Vec<Entry>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Stage labels in execution order, with [`ROUTE_LABEL`] marking dispatch.
    pub fn labels(&self) -> Vec<&str> {
        self.before_route
            .iter()
            .map(|e| e.label.as_str())
            .chain(std::iter::once(ROUTE_LABEL))
            .chain(self.after_route.iter().map(|e| e.label.as_str()))
            .collect()
    }

    /// Run every stage before route dispatch. Stops at the first response.
    pub async fn run_before(&self, ctx: &mut RequestContext) -> Result<Flow, RequestHandlerError> {
        for entry in &self.before_route {
            match entry.middleware.handle(ctx).await? {
                Flow::Next => {}
                Flow::Respond(response) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        stage = %entry.label,
                        status = %response.status,
                        "Stage answered request"
                    );
                    return Ok(Flow::Respond(response));
                }
            }
        }
        Ok(Flow::Next)
    }

    /// Run the postrequest stages. A stage answering replaces the pending
    /// response and ends the run.
    pub async fn run_after(&self, ctx: &mut RequestContext) -> Result<(), RequestHandlerError> {
        for entry in &self.after_route {
            if let Flow::Respond(response) = entry.middleware.handle(ctx).await? {
                ctx.response = Some(response);
                break;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

/// Assembles a [`Pipeline`] one step at a time.
#[derive(Default)]
pub struct PipelineBuilder {
    before_route: Vec<Entry>,
    after_route: Vec<Entry>,
}

impl PipelineBuilder {
    /// Append a built-in stage before route dispatch.
    pub fn builtin(mut self, label: &str, middleware: BoxedMiddleware) -> Self {
        self.before_route.push(Entry {
            label: label.to_string(),
            middleware,
        });
        self
    }

    /// Append every handler registered for `stage`. Postrequest handlers run
    /// after route dispatch; all others before it.
    pub fn install(mut self, stage: Stage, registry: &StageRegistry) -> Self {
        let target = if stage == Stage::PostRequest {
            &mut self.after_route
        } else {
            &mut self.before_route
        };
        for (i, middleware) in registry.handlers(stage).iter().enumerate() {
            target.push(Entry {
                label: format!("{}[{}]", stage, i),
                middleware: middleware.clone(),
            });
        }
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            before_route: self.before_route,
            after_route: self.after_route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ApiResponse;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::{Arc, Mutex};

    fn ctx() -> RequestContext {
        RequestContext::from_request(Request::new(Body::empty()))
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> BoxedMiddleware {
        let log = log.clone();
        let name = name.to_string();
        Arc::new(move |_ctx: &mut RequestContext| -> Result<Flow, RequestHandlerError> {
            log.lock().unwrap().push(name.clone());
            Ok(Flow::Next)
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = StageRegistry::new();
        registry.register(Stage::PreRequest, recorder(&log, "pre-1"));
        registry.register(Stage::PreRequest, recorder(&log, "pre-2"));
        registry.register(Stage::PreAuthentication, recorder(&log, "auth"));

        let pipeline = Pipeline::builder()
            .install(Stage::PreAuthentication, &registry)
            .builtin("query", recorder(&log, "query"))
            .install(Stage::PreRequest, &registry)
            .build();

        assert_eq!(
            pipeline.labels(),
            vec!["preauthentication[0]", "query", "prerequest[0]", "prerequest[1]", "route"]
        );

        let mut ctx = ctx();
        assert!(matches!(pipeline.run_before(&mut ctx).await.unwrap(), Flow::Next));
        assert_eq!(*log.lock().unwrap(), vec!["auth", "query", "pre-1", "pre-2"]);
    }

    #[tokio::test]
    async fn test_respond_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let deny: BoxedMiddleware = Arc::new(|_ctx: &mut RequestContext| -> Result<Flow, RequestHandlerError> {
            Ok(Flow::Respond(ApiResponse::message(StatusCode::UNAUTHORIZED, "denied")))
        });

        let pipeline = Pipeline::builder()
            .builtin("deny", deny)
            .builtin("never", recorder(&log, "never"))
            .build();

        let mut ctx = ctx();
        match pipeline.run_before(&mut ctx).await.unwrap() {
            Flow::Respond(response) => assert_eq!(response.status, StatusCode::UNAUTHORIZED),
            Flow::Next => panic!("expected a response"),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let fail: BoxedMiddleware = Arc::new(|_ctx: &mut RequestContext| -> Result<Flow, RequestHandlerError> {
            Err(RequestHandlerError::new("stage failed"))
        });
        let pipeline = Pipeline::builder().builtin("fail", fail).build();

        let err = pipeline.run_before(&mut ctx()).await.unwrap_err();
        assert_eq!(err.message(), "stage failed");
    }

    #[tokio::test]
    async fn test_postrequest_replaces_response() {
        let mut registry = StageRegistry::new();
        registry.register(
            Stage::PostRequest,
            Arc::new(|ctx: &mut RequestContext| -> Result<Flow, RequestHandlerError> {
                let status = ctx.response.as_ref().map(|r| r.status);
                assert_eq!(status, Some(StatusCode::OK));
                Ok(Flow::Respond(ApiResponse::new(StatusCode::ACCEPTED)))
            }),
        );
        let pipeline = Pipeline::builder().install(Stage::PostRequest, &registry).build();
        assert_eq!(pipeline.labels(), vec!["route", "postrequest[0]"]);

        let mut ctx = ctx();
        ctx.response = Some(ApiResponse::text("ok"));
        pipeline.run_after(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.unwrap().status, StatusCode::ACCEPTED);
    }
}
