//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit)
//!     → connection.rs (id, tracking, Idle/Processing/Cancelled state)
//!     → handle.rs (close / half-close shared with the outside)
//!     → Hand off to the pipeline
//! ```

pub mod connection;
pub mod handle;
pub mod listener;

pub use connection::{ConnectionId, ConnectionState, ConnectionTracker, StateCell};
pub use handle::ConnectionHandle;
pub use listener::Listener;
