//! Per-connection request/response pipeline.
//!
//! # Data Flow
//! ```text
//! transport parts
//!     → stream.rs (Inbound: half-close aware reader, push-back)
//!     → dispatch.rs (read head → responder → write response → keep-alive → drain)
//!     → stream.rs (Outbound: response part writer)
//!     → transport sink
//!
//! Alongside the loop, in the same task:
//!     shutdown broadcast → claim state; half-close input if idle
//!     ConnectionHandle::close → drop the loop mid-request
//!     task dropped → close the handle
//! ```
//!
//! # Design Decisions
//! - One task per connection; the loop never has two requests in flight
//! - The state cell is the only thing the loop and the shutdown path share
//! - The outbound sink is closed once, when `serve` returns

pub mod dispatch;
pub mod stream;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::config::LimitsConfig;
use crate::error::Error;
use crate::http::codec;
use crate::http::responder::Responder;
use crate::net::connection::{ConnectionState, StateCell};
use crate::net::handle::ConnectionHandle;
use crate::observability::metrics;

pub use dispatch::Termination;
pub use stream::{Inbound, Outbound, PartSink, PartStream};

/// One established connection, ready to be served.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    state: Arc<StateCell>,
    inbound: Inbound,
    outbound: Outbound,
}

impl Connection {
    /// Build a connection from an inbound part stream and an outbound part sink.
    pub fn new(parts: PartStream, sink: PartSink, handle: ConnectionHandle) -> Self {
        Self {
            inbound: Inbound::new(parts, &handle),
            outbound: Outbound::new(sink, handle.clone()),
            state: Arc::new(StateCell::new()),
            handle,
        }
    }

    /// Build a connection speaking HTTP/1.1 over a byte transport.
    pub fn from_io<IO>(io: IO, handle: ConnectionHandle, limits: &LimitsConfig) -> Self
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (parts, sink) = codec::split(io, limits);
        Self::new(parts, sink, handle)
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// The state shared with shutdown handling.
    pub fn state(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    /// Serve requests until the peer is done, the exchange asks to close,
    /// shutdown claims the connection, or the connection is closed from outside.
    ///
    /// Failures are logged at trace level and returned; the connection is
    /// closed either way.
    pub async fn serve<R: Responder>(
        self,
        responder: &R,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<Termination, Error> {
        let Connection {
            handle,
            state,
            mut inbound,
            mut outbound,
        } = self;

        let _close_on_drop = CloseOnDrop(handle.clone());

        let result = {
            let pipeline = dispatch::run(&mut inbound, &mut outbound, responder, &state, &handle);
            tokio::pin!(pipeline);

            let mut listening = true;
            loop {
                tokio::select! {
                    result = &mut pipeline => break result,
                    _ = handle.closed() => {
                        tracing::trace!(connection_id = %handle.id(), "Connection closed from outside");
                        break Ok(Termination::Aborted);
                    }
                    signal = shutdown.recv(), if listening => {
                        listening = false;
                        match signal {
                            Ok(()) | Err(RecvError::Lagged(_)) => graceful_shutdown(&state, &handle),
                            // Nobody can signal shutdown any more.
                            Err(RecvError::Closed) => {}
                        }
                    }
                }
            }
        };

        if let Err(e) = outbound.close().await {
            tracing::trace!(connection_id = %handle.id(), error = %e, "Failed to close connection output");
        }
        handle.close();

        match &result {
            Ok(termination) => {
                tracing::debug!(connection_id = %handle.id(), ?termination, "Connection finished");
            }
            Err(e) => {
                tracing::trace!(
                    connection_id = %handle.id(),
                    error = %e,
                    class = e.class().as_str(),
                    "Connection terminated by failure"
                );
                metrics::record_connection_error(e.class());
            }
        }

        result
    }
}

/// Soft shutdown: claim the state and stop new requests from starting.
///
/// An idle connection has its input closed now. A busy one is left alone;
/// the pipeline sees `Cancelled` when it releases the request.
fn graceful_shutdown(state: &StateCell, handle: &ConnectionHandle) {
    match state.exchange(ConnectionState::Cancelled) {
        ConnectionState::Idle => {
            tracing::trace!(connection_id = %handle.id(), "Shutdown while idle, closing input");
            handle.close_input();
        }
        previous => {
            tracing::trace!(connection_id = %handle.id(), ?previous, "Shutdown deferred to in-flight request");
        }
    }
}

/// Hard cancellation: dropping `serve` closes the connection.
struct CloseOnDrop(ConnectionHandle);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}
