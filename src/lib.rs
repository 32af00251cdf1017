//! HTTP/1.x per-connection pipeline.
//!
//! Each accepted connection runs one sequential loop: read a request head,
//! hand the request to a [`Responder`], write the response back, decide
//! keep-alive, discard any unread request body, repeat. A shutdown signal
//! may claim the connection at any point; it closes idle connections at once
//! and lets a busy one finish the response it is writing.
//!
//! ```text
//!     Listener ─▶ HttpServer ─▶ Connection::serve ─▶ Responder
//!                                 │   ▲
//!                      codec ◀────┘   └──── Shutdown / ConnectionHandle
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pipeline;

pub use config::ServerConfig;
pub use error::{BoxError, Error, ErrorClass};
pub use http::{HttpServer, Request, Responder, Response, ResponseBody};
pub use lifecycle::Shutdown;
pub use net::{ConnectionHandle, ConnectionState, Listener};
pub use pipeline::{Connection, Termination};
