//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting
//!             → idle connections half-close their input
//!             → busy connections finish the current response, then close
//!             → grace period elapses → remaining connections aborted
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
