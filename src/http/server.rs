//! HTTP service and request dispatch.
//!
//! # Responsibilities
//! - Build the Axum router with its tower layers (trace, request ID, `Server` header)
//! - Run every request through pipeline, route dispatch and postrequest stages
//! - Bridge routing outcomes and failures into events
//! - Recover handler errors and panics into 500 responses
//! - Render the response and stamp the response-time header
//!
//! # Design Decisions
//! - One fallback handler owns all paths; routing is ours, not Axum's
//! - A failing request never affects other in-flight requests

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::schema::DEFAULT_NAME;
use crate::events::{EventHub, ResponseSummary, ServerEvent};
use crate::http::error::{panic_message, UNKNOWN_ERROR};
use crate::http::format::{Formatters, ResponseTimeFormatter};
use crate::http::response::fallback_response;
use crate::http::{ApiResponse, RequestContext, RequestHandlerError};
use crate::lifecycle::shutdown::InFlightTracker;
use crate::lifecycle::startup::ListenerOptions;
use crate::observability::metrics;
use crate::pipeline::{Flow, Pipeline};
use crate::routing::{Resolution, Router, VersionSpec};

/// Everything a request needs, frozen at start.
pub struct Dispatcher {
    default_version: String,
    response_time_header: HeaderName,
    response_time_formatter: Option<ResponseTimeFormatter>,
    formatters: Formatters,
    pipeline: Pipeline,
    router: Router,
    hub: EventHub,
    tracker: InFlightTracker,
}

impl Dispatcher {
    pub fn new(
        options: &ListenerOptions,
        pipeline: Pipeline,
        router: Router,
        hub: EventHub,
        tracker: InFlightTracker,
    ) -> Self {
        Self {
            default_version: options.default_version.clone(),
            response_time_header: options.response_time_header.clone(),
            response_time_formatter: options.response_time_formatter.clone(),
            formatters: options.formatters.clone(),
            pipeline,
            router,
            hub,
            tracker,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Handle one request end to end. Never fails.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let _guard = self.tracker.track();
        let mut ctx = RequestContext::from_request(request);

        tracing::debug!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path(),
            "Dispatching request"
        );

        let outcome = AssertUnwindSafe(self.process(&mut ctx)).catch_unwind().await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => self.recover(&ctx, err),
            Err(payload) => self.recover_panic(&ctx, payload.as_ref()),
        };

        let mut rendered = match response.render(ctx.accepted.as_ref(), &self.formatters) {
            Ok(rendered) => rendered,
            Err(err) => {
                tracing::error!(request_id = %ctx.request_id, error = %err, "Failed to render response");
                self.hub.emit(ServerEvent::Error {
                    error: err.to_string(),
                });
                fallback_response(err.public_message())
            }
        };

        let elapsed = ctx.elapsed();
        self.stamp_response_time(&mut rendered, elapsed);

        let summary = ResponseSummary {
            status: rendered.status(),
            elapsed,
        };
        metrics::record_request(
            ctx.method.as_str(),
            summary.status.as_u16(),
            ctx.route.as_deref().unwrap_or("none"),
            elapsed,
        );

        let request = ctx.summary();
        if ctx.route.is_some() {
            self.hub.emit(ServerEvent::ApiAfter {
                request: request.clone(),
                response: summary.clone(),
                route: ctx.route.clone(),
            });
        }
        self.hub.emit(ServerEvent::RequestEnd {
            request,
            response: summary,
        });

        rendered
    }

    async fn process(&self, ctx: &mut RequestContext) -> Result<ApiResponse, RequestHandlerError> {
        if let Flow::Respond(response) = self.pipeline.run_before(ctx).await? {
            return Ok(response);
        }

        let requested = ctx
            .requested_version
            .clone()
            .unwrap_or_else(|| self.default_version.clone());
        let spec = VersionSpec::parse(&requested);

        let response = match self.router.resolve(&ctx.method, ctx.path(), &spec) {
            Resolution::Matched {
                route,
                params,
                version,
            } => {
                ctx.params = params;
                ctx.route = Some(route.name.clone());
                ctx.version = version;
                route.handler.call(ctx).await?
            }
            Resolution::MethodNotAllowed { allowed } => {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                let mut response = ApiResponse::message(
                    StatusCode::METHOD_NOT_ALLOWED,
                    format!("{} is not allowed", ctx.method),
                );
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers.insert(header::ALLOW, value);
                }
                self.bridge(ctx, &response, |request, response| ServerEvent::MethodNotAllowed {
                    request,
                    response,
                });
                response
            }
            Resolution::VersionNotAllowed { supported } => {
                let response = ApiResponse::json(json!({
                    "message": format!("{} is not supported by {} {}", requested, ctx.method, ctx.path()),
                    "supported": supported,
                }))
                .with_status(StatusCode::BAD_REQUEST);
                self.bridge(ctx, &response, |request, response| ServerEvent::ApiVersionNotAllowed {
                    request,
                    response,
                });
                response
            }
            Resolution::NotFound => {
                let response = ApiResponse::new(StatusCode::NOT_FOUND);
                self.bridge(ctx, &response, |request, response| ServerEvent::NotFound {
                    request,
                    response,
                });
                response
            }
        };

        ctx.response = Some(response);
        self.pipeline.run_after(ctx).await?;
        Ok(ctx
            .response
            .take()
            .unwrap_or_else(|| ApiResponse::new(StatusCode::NO_CONTENT)))
    }

    fn bridge<F>(&self, ctx: &RequestContext, response: &ApiResponse, event: F)
    where
        F: FnOnce(crate::events::RequestSummary, ResponseSummary) -> ServerEvent,
    {
        tracing::debug!(
            request_id = %ctx.request_id,
            status = %response.status,
            "Request rejected by router"
        );
        self.hub.emit(event(
            ctx.summary(),
            ResponseSummary {
                status: response.status,
                elapsed: ctx.elapsed(),
            },
        ));
    }

    fn recover(&self, ctx: &RequestContext, err: RequestHandlerError) -> ApiResponse {
        tracing::error!(
            request_id = %ctx.request_id,
            route = ctx.route.as_deref().unwrap_or("none"),
            error = %err,
            "Request failed"
        );
        self.hub.emit(ServerEvent::Error {
            error: err.to_string(),
        });
        ApiResponse::message(StatusCode::INTERNAL_SERVER_ERROR, err.public_message())
    }

    fn recover_panic(&self, ctx: &RequestContext, payload: &(dyn Any + Send)) -> ApiResponse {
        let error = panic_message(payload);
        tracing::error!(
            request_id = %ctx.request_id,
            route = ctx.route.as_deref().unwrap_or("none"),
            error = %error,
            "Request handler panicked"
        );
        let response = ApiResponse::message(StatusCode::INTERNAL_SERVER_ERROR, UNKNOWN_ERROR);
        self.hub.emit(ServerEvent::UncaughtException {
            request: ctx.summary(),
            response: ResponseSummary {
                status: response.status,
                elapsed: ctx.elapsed(),
            },
            route: ctx.route.clone(),
            error,
        });
        response
    }

    fn stamp_response_time(&self, response: &mut Response, elapsed: Duration) {
        let millis = elapsed.as_secs_f64() * 1000.0;
        let value = match &self.response_time_formatter {
            Some(formatter) => formatter.format(millis),
            None => format!("{}", millis.round() as u64),
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(self.response_time_header.clone(), value);
            }
            Err(_) => tracing::warn!(value = %value, "Response time formatter produced an invalid header value"),
        }
    }
}

/// Build the Axum router around a dispatcher.
pub fn build_router(dispatcher: Arc<Dispatcher>, server_name: &str) -> axum::Router {
    let server = HeaderValue::from_str(server_name).unwrap_or_else(|_| {
        tracing::warn!(name = %server_name, "Server name is not a valid header value");
        HeaderValue::from_static(DEFAULT_NAME)
    });

    axum::Router::new()
        .fallback(handle)
        .with_state(dispatcher)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(SetResponseHeaderLayer::if_not_present(header::SERVER, server)),
        )
}

async fn handle(State(dispatcher): State<Arc<Dispatcher>>, request: Request<Body>) -> Response {
    dispatcher.dispatch(request).await
}
