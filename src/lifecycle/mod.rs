//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! main
//!     → Shutdown::new()
//!     → subscribers: HTTP server, bucket sweeper
//!     → Ctrl+C → trigger() → server drains, sweeper exits
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
