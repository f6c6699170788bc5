//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → middleware/observability.rs (request counter, latency, access log)
//!     → handlers.rs (spans, profile tags, store calls)
//!     → response.rs (JSON errors)
//!     → Send to client
//! ```

pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod response;
pub mod server;

pub use metrics::TodoMetrics;
pub use response::ApiError;
pub use server::{AppState, HttpServer};
