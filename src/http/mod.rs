//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → codec.rs (bytes → RequestPart, ResponsePart → bytes)
//!     → request.rs (head + borrowed body handed to the responder)
//!     → responder.rs (application)
//!     → response.rs (head + body written back as parts)
//!     → close_reason.rs (keep the connection or not)
//!
//! server.rs accepts connections and runs one pipeline per connection.
//! ```

pub mod close_reason;
pub mod codec;
pub mod part;
pub mod request;
pub mod responder;
pub mod response;
pub mod server;

pub use close_reason::CloseReason;
pub use part::{RequestHead, RequestPart, ResponseHead, ResponsePart};
pub use request::{Request, RequestBody};
pub use responder::Responder;
pub use response::{BodyWriter, Response, ResponseBody, WriteBody};
pub use server::HttpServer;
