//! Route table and dispatch resolution.
//!
//! # Responsibilities
//! - Hold the explicit routes registered by collaborators
//! - Generate the fallback root route and the catch-all route at start
//! - Resolve a request to a route, or to 405 / version-not-allowed
//!
//! # Design Decisions
//! - Immutable after generation (shared without locks)
//! - Three tiers: explicit > generated root fallback > catch-all
//! - O(n) scan over routes (acceptable for typical route counts)

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::events::{EventHub, ResponseSummary, ServerEvent};
use crate::http::{ApiResponse, RequestContext, RequestHandlerError};
use crate::routing::handler::{BoxedHandler, Handler};
use crate::routing::matcher::{AnyPath, Matcher, Params, PathPattern, PatternError};
use crate::routing::version::{DeclaredVersion, VersionSpec};

/// Methods the generated routes answer, and the ones `all()` registers.
pub const ALL_METHODS: [Method; 5] = [Method::GET, Method::PUT, Method::POST, Method::DELETE, Method::HEAD];

pub const NO_ROUTES_MESSAGE: &str = "server is running; no application routes configured";
pub const NO_ROOT_MESSAGE: &str = "root route not explicitly configured";

/// A route as registered, before generation.
#[derive(Clone)]
pub struct RouteDefinition {
    pub name: String,
    pub pattern: PathPattern,
    pub methods: Vec<Method>,
    /// Empty means the server's default version.
    pub versions: Vec<String>,
    pub handler: BoxedHandler,
}

impl RouteDefinition {
    pub fn new(pattern: &str, methods: Vec<Method>, handler: BoxedHandler) -> Result<Self, PatternError> {
        let pattern = PathPattern::parse(pattern)?;
        let name = format!(
            "{} {}",
            methods.iter().map(Method::as_str).collect::<Vec<_>>().join("|"),
            pattern
        );
        Ok(Self {
            name,
            pattern,
            methods,
            versions: Vec::new(),
            handler,
        })
    }

    pub fn with_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("name", &self.name)
            .field("versions", &self.versions)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Explicit,
    RootFallback,
    CatchAll,
}

/// A route in the generated table.
pub struct Route {
    pub name: String,
    pub kind: RouteKind,
    matcher: Box<dyn Matcher>,
    methods: Vec<Method>,
    /// Empty means any version (generated routes).
    versions: Vec<DeclaredVersion>,
    pub handler: BoxedHandler,
}

impl Route {
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn versions(&self) -> &[DeclaredVersion] {
        &self.versions
    }

    fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("matcher", &self.matcher)
            .field("methods", &self.methods)
            .field("versions", &self.versions)
            .finish()
    }
}

/// Outcome of resolving a request.
#[derive(Debug)]
pub enum Resolution<'r> {
    Matched {
        route: &'r Route,
        params: Params,
        /// Negotiated version; `None` for generated routes.
        version: Option<String>,
    },
    MethodNotAllowed {
        allowed: Vec<Method>,
    },
    VersionNotAllowed {
        supported: Vec<String>,
    },
    NotFound,
}

/// The generated route table.
#[derive(Debug)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Build the table: explicit routes in registration order, then the
    /// root fallback when no explicit route serves `/`, then the catch-all.
    pub fn generate(definitions: Vec<RouteDefinition>, default_version: &str, hub: EventHub) -> Self {
        let any_explicit = !definitions.is_empty();
        let mut routes: Vec<Route> = definitions
            .into_iter()
            .map(|def| {
                let versions = if def.versions.is_empty() {
                    vec![DeclaredVersion::new(default_version)]
                } else {
                    def.versions.iter().map(|v| DeclaredVersion::new(v)).collect()
                };
                Route {
                    name: def.name,
                    kind: RouteKind::Explicit,
                    matcher: Box::new(def.pattern),
                    methods: def.methods,
                    versions,
                    handler: def.handler,
                }
            })
            .collect();

        let root_exists = routes.iter().any(|route| {
            route.matcher.matches("/").is_some() && ALL_METHODS.iter().any(|m| route.allows(m))
        });

        if !root_exists {
            let message = if any_explicit {
                NO_ROOT_MESSAGE
            } else {
                NO_ROUTES_MESSAGE
            };
            tracing::info!(fallback = message, "Generating fallback root route");
            routes.push(Route {
                name: "root-fallback".to_string(),
                kind: RouteKind::RootFallback,
                matcher: Box::new(PathPattern::root()),
                methods: ALL_METHODS.to_vec(),
                versions: Vec::new(),
                handler: Arc::new(RootFallback { message }),
            });
        }

        routes.push(Route {
            name: "catch-all".to_string(),
            kind: RouteKind::CatchAll,
            matcher: Box::new(AnyPath),
            methods: ALL_METHODS.to_vec(),
            versions: Vec::new(),
            handler: Arc::new(CatchAll { hub }),
        });

        tracing::debug!(routes = routes.len(), root_exists, "Route table generated");
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn resolve(&self, method: &Method, path: &str, requested: &VersionSpec) -> Resolution<'_> {
        let mut allowed: Vec<Method> = Vec::new();

        // Explicit tier: version negotiation across every route for this path and method.
        let mut best: Option<(&Route, Params, &DeclaredVersion)> = None;
        let mut supported: Vec<&DeclaredVersion> = Vec::new();
        let mut explicit_hit = false;
        for route in self.routes.iter().filter(|r| r.kind == RouteKind::Explicit) {
            let Some(params) = route.matcher.matches(path) else {
                continue;
            };
            push_methods(&mut allowed, route.methods());
            if !route.allows(method) {
                continue;
            }
            explicit_hit = true;
            supported.extend(route.versions.iter());
            // Highest satisfying version; first registered wins ties.
            let candidate = route
                .versions
                .iter()
                .filter(|v| requested.satisfied_by(v))
                .max();
            if let Some(version) = candidate {
                if best.as_ref().map_or(true, |(_, _, current)| version > *current) {
                    best = Some((route, params, version));
                }
            }
        }

        if let Some((route, params, version)) = best {
            return Resolution::Matched {
                route,
                params,
                version: Some(version.as_str().to_string()),
            };
        }
        if explicit_hit {
            supported.sort();
            supported.dedup();
            return Resolution::VersionNotAllowed {
                supported: supported.iter().map(|v| v.as_str().to_string()).collect(),
            };
        }
        if !allowed.is_empty() {
            // The root fallback still answers `/` for methods no explicit route serves.
            let fallback = self
                .routes
                .iter()
                .filter(|r| r.kind == RouteKind::RootFallback && r.allows(method))
                .find_map(|route| route.matcher.matches(path).map(|params| (route, params)));
            return match fallback {
                Some((route, params)) => Resolution::Matched {
                    route,
                    params,
                    version: None,
                },
                None => Resolution::MethodNotAllowed { allowed },
            };
        }

        for route in self.routes.iter().filter(|r| r.kind != RouteKind::Explicit) {
            let Some(params) = route.matcher.matches(path) else {
                continue;
            };
            if route.allows(method) {
                return Resolution::Matched {
                    route,
                    params,
                    version: None,
                };
            }
            push_methods(&mut allowed, route.methods());
        }

        if allowed.is_empty() {
            Resolution::NotFound
        } else {
            Resolution::MethodNotAllowed { allowed }
        }
    }
}

fn push_methods(allowed: &mut Vec<Method>, methods: &[Method]) {
    for method in methods {
        if !allowed.contains(method) {
            allowed.push(method.clone());
        }
    }
}

/// Answers `/` when no explicit route does.
struct RootFallback {
    message: &'static str,
}

#[async_trait]
impl Handler for RootFallback {
    async fn call(&self, _ctx: &mut RequestContext) -> Result<ApiResponse, RequestHandlerError> {
        Ok(ApiResponse::json(json!({ "message": self.message })))
    }
}

/// Lowest-priority route: emits `notFound` and answers 404 with no body.
struct CatchAll {
    hub: EventHub,
}

#[async_trait]
impl Handler for CatchAll {
    async fn call(&self, ctx: &mut RequestContext) -> Result<ApiResponse, RequestHandlerError> {
        tracing::debug!(request_id = %ctx.request_id, path = %ctx.path(), "No route matched");
        self.hub.emit(ServerEvent::NotFound {
            request: ctx.summary(),
            response: ResponseSummary {
                status: StatusCode::NOT_FOUND,
                elapsed: ctx.elapsed(),
            },
        });
        Ok(ApiResponse::new(StatusCode::NOT_FOUND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn handler(body: &'static str) -> BoxedHandler {
        Arc::new(move |_ctx: &mut RequestContext| -> Result<ApiResponse, RequestHandlerError> {
            Ok(ApiResponse::text(body))
        })
    }

    fn def(pattern: &str, methods: &[Method], body: &'static str) -> RouteDefinition {
        RouteDefinition::new(pattern, methods.to_vec(), handler(body)).unwrap()
    }

    fn any() -> VersionSpec {
        VersionSpec::parse("1.0.0")
    }

    fn matched_name(resolution: Resolution<'_>) -> String {
        match resolution {
            Resolution::Matched { route, .. } => route.name.clone(),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn test_no_routes_generates_root_and_catch_all() {
        let router = Router::generate(Vec::new(), "1.0.0", EventHub::default());
        let kinds: Vec<RouteKind> = router.routes().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RouteKind::RootFallback, RouteKind::CatchAll]);

        assert_eq!(matched_name(router.resolve(&Method::GET, "/", &any())), "root-fallback");
        assert_eq!(matched_name(router.resolve(&Method::DELETE, "/nope", &any())), "catch-all");
    }

    #[test]
    fn test_explicit_root_suppresses_fallback() {
        let router = Router::generate(vec![def("/", &[Method::GET], "root")], "1.0.0", EventHub::default());
        assert!(router.routes().iter().all(|r| r.kind != RouteKind::RootFallback));
        assert_eq!(matched_name(router.resolve(&Method::GET, "/", &any())), "GET /");
    }

    #[test]
    fn test_root_fallback_serves_methods_explicit_root_lacks() {
        let router = Router::generate(vec![def("/", &[Method::PATCH], "patch")], "1.0.0", EventHub::default());
        assert!(router.routes().iter().any(|r| r.kind == RouteKind::RootFallback));

        assert_eq!(matched_name(router.resolve(&Method::GET, "/", &any())), "root-fallback");
        assert_eq!(matched_name(router.resolve(&Method::PATCH, "/", &any())), "PATCH /");
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let router = Router::generate(
            vec![def("/users", &[Method::GET], "list"), def("/users", &[Method::POST], "create")],
            "1.0.0",
            EventHub::default(),
        );
        match router.resolve(&Method::DELETE, "/users", &any()) {
            Resolution::MethodNotAllowed { allowed } => assert_eq!(allowed, vec![Method::GET, Method::POST]),
            other => panic!("expected 405, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_method_on_unmatched_path() {
        let router = Router::generate(Vec::new(), "1.0.0", EventHub::default());
        match router.resolve(&Method::PATCH, "/nope", &any()) {
            Resolution::MethodNotAllowed { allowed } => assert_eq!(allowed, ALL_METHODS.to_vec()),
            other => panic!("expected 405, got {other:?}"),
        }
    }

    #[test]
    fn test_highest_satisfying_version_wins() {
        let router = Router::generate(
            vec![
                def("/items", &[Method::GET], "v1").with_versions(["1.0.0"]).with_name("v1"),
                def("/items", &[Method::GET], "v2").with_versions(["2.0.0", "2.1.0"]).with_name("v2"),
                def("/items", &[Method::GET], "v2-dup").with_versions(["2.1.0"]).with_name("v2-dup"),
            ],
            "1.0.0",
            EventHub::default(),
        );

        match router.resolve(&Method::GET, "/items", &VersionSpec::parse("^2")) {
            Resolution::Matched { route, version, .. } => {
                assert_eq!(route.name, "v2");
                assert_eq!(version.as_deref(), Some("2.1.0"));
            }
            other => panic!("expected a match, got {other:?}"),
        }
        assert_eq!(matched_name(router.resolve(&Method::GET, "/items", &VersionSpec::parse("1.0.0"))), "v1");
    }

    #[test]
    fn test_version_not_allowed() {
        let router = Router::generate(
            vec![def("/items", &[Method::GET], "v1").with_versions(["1.0.0", "1.1.0"])],
            "1.0.0",
            EventHub::default(),
        );
        match router.resolve(&Method::GET, "/items", &VersionSpec::parse("3")) {
            Resolution::VersionNotAllowed { supported } => assert_eq!(supported, vec!["1.0.0", "1.1.0"]),
            other => panic!("expected version rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_versions_use_default() {
        let router = Router::generate(vec![def("/a", &[Method::GET], "a")], "2.0.0", EventHub::default());
        assert_eq!(router.routes()[0].versions()[0].as_str(), "2.0.0");
        assert!(matches!(
            router.resolve(&Method::GET, "/a", &VersionSpec::parse("1.0.0")),
            Resolution::VersionNotAllowed { .. }
        ));
    }

    #[test]
    fn test_generated_routes_accept_any_version() {
        let router = Router::generate(Vec::new(), "1.0.0", EventHub::default());
        assert_eq!(
            matched_name(router.resolve(&Method::GET, "/", &VersionSpec::parse("9.9.9"))),
            "root-fallback"
        );
    }

    #[tokio::test]
    async fn test_catch_all_emits_not_found() {
        let hub = EventHub::new(8);
        let mut rx = hub.subscribe();
        let router = Router::generate(Vec::new(), "1.0.0", hub);

        let route = match router.resolve(&Method::GET, "/missing", &any()) {
            Resolution::Matched { route, .. } => route,
            other => panic!("expected catch-all, got {other:?}"),
        };
        let mut ctx = RequestContext::from_request(
            axum::http::Request::builder()
                .uri("/missing")
                .body(axum::body::Body::empty())
                .unwrap(),
        );
        let response = route.handler.call(&mut ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), EventKind::NotFound);
        assert!(rx.try_recv().is_err());
    }
}
