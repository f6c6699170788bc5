//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Open store → Instrument store → Migrate → Build router
//!         → Instrument router → Bind listener → Serve
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain in-flight requests → Return
//!     → main flushes telemetry once the runtime is gone
//! ```
//!
//! # Design Decisions
//! - Ordered startup: the store is ready before the listener binds
//! - Any startup error is fatal and surfaces from `main`
//! - Telemetry shutdown is not part of this module; it needs a thread
//!   outside the async runtime

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::StartupError;
