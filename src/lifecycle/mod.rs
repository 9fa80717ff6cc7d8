//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! start() (controller.rs):
//!     Idle → Starting → assemble pipeline + routes (startup.rs)
//!         → load TLS → bind → Running, emit start + ready
//!
//! stop() (controller.rs):
//!     Running → Stopping → stop accepting → drain (shutdown.rs) → Stopped, emit stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls stop()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: pipeline first, then routes, listener last
//! - Shutdown has a timeout: requests still running are cut off
//! - Stopped is terminal; a stopped server is not restarted

pub mod controller;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use controller::{ApiServer, RegistrationError};
pub use shutdown::{InFlightTracker, RequestGuard};
pub use signals::shutdown_signal;
pub use startup::{ListenerOptions, ServerStartError};
pub use state::{LifecycleError, ServerState};
