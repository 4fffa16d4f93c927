//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → security::rate_limit (admission decision)
//!     → server.rs forward handler → forwarding::ForwardGateway
//!     → response.rs (status pass-through, x-cache)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use response::{outcome_response, X_CACHE};
pub use server::{build_router, AppState, HttpServer};
