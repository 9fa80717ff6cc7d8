//! The server instance and its lifecycle.
//!
//! # Responsibilities
//! - Collect stages and routes while idle
//! - Run the fixed start sequence and own the listener task
//! - Drain and stop on request
//!
//! # Design Decisions
//! - Registration takes `&mut self`; `start`/`stop` take `&self` so a started
//!   server can be shared behind an `Arc`
//! - State changes go through checked transitions only

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::http::Method;
use axum_server::Handle;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::{normalize, ConfigError, RawConfig, ServerConfig};
use crate::events::{EventHub, ServerEvent};
use crate::http::server::build_router;
use crate::lifecycle::shutdown::InFlightTracker;
use crate::lifecycle::startup::{assemble, ListenerOptions, ServerStartError};
use crate::lifecycle::state::{LifecycleError, ServerState, StateCell};
use crate::net::{listener, tls};
use crate::pipeline::{Middleware, Stage, StageRegistry};
use crate::routing::{Handler, PatternError, RouteDefinition, ALL_METHODS};

/// Why a stage or route could not be registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

struct Running {
    handle: Handle,
    task: JoinHandle<io::Result<()>>,
    local_addr: SocketAddr,
}

/// An API server: configuration, extension points and lifecycle.
pub struct ApiServer {
    config: ServerConfig,
    hub: EventHub,
    state: StateCell,
    stages: StageRegistry,
    routes: Vec<RouteDefinition>,
    tracker: InFlightTracker,
    running: Mutex<Option<Running>>,
}

impl ApiServer {
    pub fn new(config: ServerConfig) -> Self {
        let hub = EventHub::new(config.event_capacity);
        Self {
            config,
            hub,
            state: StateCell::new(),
            stages: StageRegistry::new(),
            routes: Vec::new(),
            tracker: InFlightTracker::new(),
            running: Mutex::new(None),
        }
    }

    /// Normalize and validate `raw`, then build the server.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(normalize(raw)?))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventHub {
        &self.hub
    }

    /// Shorthand for `events().subscribe()`.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.hub.subscribe()
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    pub fn state_changes(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .expect("listener lock poisoned")
            .as_ref()
            .map(|running| running.local_addr)
    }

    /// Requests currently being processed.
    pub fn in_flight(&self) -> usize {
        self.tracker.count()
    }

    fn ensure_open(&self) -> Result<(), LifecycleError> {
        match self.state.get() {
            ServerState::Idle => Ok(()),
            state => Err(LifecycleError::RegistrationClosed { state }),
        }
    }

    /// Append `middleware` to a stage slot.
    pub fn use_stage<M>(&mut self, stage: Stage, middleware: M) -> Result<&mut Self, RegistrationError>
    where
        M: Middleware + 'static,
    {
        self.ensure_open()?;
        self.stages.register(stage, Arc::new(middleware));
        Ok(self)
    }

    pub fn pre_authentication<M>(&mut self, middleware: M) -> Result<&mut Self, RegistrationError>
    where
        M: Middleware + 'static,
    {
        self.use_stage(Stage::PreAuthentication, middleware)
    }

    pub fn post_authentication<M>(&mut self, middleware: M) -> Result<&mut Self, RegistrationError>
    where
        M: Middleware + 'static,
    {
        self.use_stage(Stage::PostAuthentication, middleware)
    }

    pub fn pre_authorization<M>(&mut self, middleware: M) -> Result<&mut Self, RegistrationError>
    where
        M: Middleware + 'static,
    {
        self.use_stage(Stage::PreAuthorization, middleware)
    }

    pub fn post_authorization<M>(&mut self, middleware: M) -> Result<&mut Self, RegistrationError>
    where
        M: Middleware + 'static,
    {
        self.use_stage(Stage::PostAuthorization, middleware)
    }

    pub fn pre_request<M>(&mut self, middleware: M) -> Result<&mut Self, RegistrationError>
    where
        M: Middleware + 'static,
    {
        self.use_stage(Stage::PreRequest, middleware)
    }

    /// Runs after the route handler. A `Flow::Respond` here replaces the response.
    pub fn post_request<M>(&mut self, middleware: M) -> Result<&mut Self, RegistrationError>
    where
        M: Middleware + 'static,
    {
        self.use_stage(Stage::PostRequest, middleware)
    }

    pub fn add_route(&mut self, definition: RouteDefinition) -> Result<&mut Self, RegistrationError> {
        self.ensure_open()?;
        tracing::debug!(route = %definition.name, versions = ?definition.versions, "Route registered");
        self.routes.push(definition);
        Ok(self)
    }

    /// Register `handler` for `methods` on `pattern`, serving `versions`
    /// (empty means the default version).
    pub fn route<H>(
        &mut self,
        methods: Vec<Method>,
        pattern: &str,
        versions: &[&str],
        handler: H,
    ) -> Result<&mut Self, RegistrationError>
    where
        H: Handler + 'static,
    {
        let definition = RouteDefinition::new(pattern, methods, Arc::new(handler))?
            .with_versions(versions.iter().copied());
        self.add_route(definition)
    }

    pub fn get<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RegistrationError>
    where
        H: Handler + 'static,
    {
        self.route(vec![Method::GET], pattern, &[], handler)
    }

    pub fn put<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RegistrationError>
    where
        H: Handler + 'static,
    {
        self.route(vec![Method::PUT], pattern, &[], handler)
    }

    pub fn post<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RegistrationError>
    where
        H: Handler + 'static,
    {
        self.route(vec![Method::POST], pattern, &[], handler)
    }

    pub fn del<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RegistrationError>
    where
        H: Handler + 'static,
    {
        self.route(vec![Method::DELETE], pattern, &[], handler)
    }

    pub fn head<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RegistrationError>
    where
        H: Handler + 'static,
    {
        self.route(vec![Method::HEAD], pattern, &[], handler)
    }

    /// Register `handler` once per supported method.
    pub fn all<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, RegistrationError>
    where
        H: Handler + 'static,
    {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        for method in ALL_METHODS {
            let definition = RouteDefinition::new(pattern, vec![method], Arc::clone(&handler))?;
            self.add_route(definition)?;
        }
        Ok(self)
    }

    /// Start serving.
    ///
    /// A no-op while already starting or running. A failed start leaves the
    /// server idle.
    pub async fn start(&self) -> Result<(), ServerStartError> {
        match self.state.transition(ServerState::Idle, ServerState::Starting) {
            Ok(()) => {}
            Err(LifecycleError::InvalidTransition {
                from: state @ (ServerState::Starting | ServerState::Running),
                ..
            }) => {
                tracing::warn!(state = %state, "start() called while already started; ignoring");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(name = %self.config.name, address = %self.config.bind_address(), "Starting server");

        match self.launch().await {
            Ok(running) => {
                let local_addr = running.local_addr;
                *self.running.lock().expect("listener lock poisoned") = Some(running);
                self.state.transition(ServerState::Starting, ServerState::Running)?;
                tracing::info!(address = %local_addr, tls = self.config.tls().is_some(), "Server ready");
                self.hub.emit(ServerEvent::Start);
                self.hub.emit(ServerEvent::Ready);
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "Server failed to start");
                self.state.transition(ServerState::Starting, ServerState::Idle)?;
                Err(err)
            }
        }
    }

    async fn launch(&self) -> Result<Running, ServerStartError> {
        let options = ListenerOptions::from_config(&self.config);
        let dispatcher = assemble(
            &self.config,
            &options,
            &self.stages,
            self.routes.clone(),
            &self.hub,
            self.tracker.clone(),
        );

        let rustls = match &options.tls {
            Some(material) => Some(tls::load_rustls_config(material).await?),
            None => None,
        };

        let bound = listener::bind(&self.config.host, self.config.port).await?;
        let app = build_router(Arc::new(dispatcher), &options.name);
        let handle = Handle::new();

        let task = match rustls {
            Some(rustls) => {
                let server = axum_server::tls_rustls::from_tcp_rustls(bound.inner, rustls)
                    .handle(handle.clone());
                tokio::spawn(server.serve(app.into_make_service()))
            }
            None => {
                let server = axum_server::from_tcp(bound.inner).handle(handle.clone());
                tokio::spawn(server.serve(app.into_make_service()))
            }
        };

        match handle.listening().await {
            Some(local_addr) => Ok(Running {
                handle,
                task,
                local_addr,
            }),
            None => {
                let err = match task.await {
                    Ok(Err(err)) => err,
                    Ok(Ok(())) => io::Error::other("listener exited before accepting connections"),
                    Err(join) => io::Error::other(join),
                };
                Err(ServerStartError::Serve(err))
            }
        }
    }

    /// Stop accepting, drain in-flight requests, then stop.
    ///
    /// Requests still running after `shutdown_timeout` are cut off. A no-op
    /// unless the server is running.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        if let Err(err) = self.state.transition(ServerState::Running, ServerState::Stopping) {
            tracing::info!(state = %self.state.get(), reason = %err, "stop() called while not running; ignoring");
            return Ok(());
        }

        let running = self.running.lock().expect("listener lock poisoned").take();
        if let Some(running) = running {
            tracing::info!(
                in_flight = self.tracker.count(),
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Draining connections"
            );
            running.handle.graceful_shutdown(Some(self.config.shutdown_timeout));
            match running.task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(error = %err, "Listener exited with error"),
                Err(err) => tracing::error!(error = %err, "Listener task failed"),
            }
            if self.tracker.count() > 0 {
                tracing::warn!(in_flight = self.tracker.count(), "Shutdown timeout reached; requests cut off");
            }
        }

        self.state.transition(ServerState::Stopping, ServerState::Stopped)?;
        tracing::info!("Server stopped");
        self.hub.emit(ServerEvent::Stop);
        Ok(())
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if let Ok(running) = self.running.get_mut() {
            if let Some(running) = running.take() {
                running.handle.shutdown();
            }
        }
    }
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("name", &self.config.name)
            .field("state", &self.state.get())
            .field("stages", &self.stages)
            .field("routes", &self.routes.len())
            .finish()
    }
}
