//! Shared capability to close a connection from outside its pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;

use super::connection::ConnectionId;

/// Cheaply cloneable handle to one connection.
///
/// Closing is idempotent: only the first call of each kind has an effect, so
/// the pipeline teardown, the shutdown handler and task cancellation may all
/// race to close without double-closing.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    input_closed: watch::Sender<bool>,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, peer_addr: Option<SocketAddr>) -> Self {
        let (input_closed, _) = watch::channel(false);
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                id,
                peer_addr,
                input_closed,
                closed,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr
    }

    /// Half-close: no further inbound parts will be delivered.
    ///
    /// Returns `true` if this call closed the input.
    pub fn close_input(&self) -> bool {
        let changed = set_once(&self.inner.input_closed);
        if changed {
            tracing::trace!(connection_id = %self.inner.id, "Connection input closed");
        }
        changed
    }

    /// Full close: input ends and every further write fails.
    ///
    /// Returns `true` if this call closed the connection.
    pub fn close(&self) -> bool {
        self.close_input();
        let changed = set_once(&self.inner.closed);
        if changed {
            tracing::trace!(connection_id = %self.inner.id, "Connection closed");
        }
        changed
    }

    pub fn is_input_closed(&self) -> bool {
        *self.inner.input_closed.borrow()
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once [`ConnectionHandle::close`] has been called.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        // The sender lives as long as `self`, so this only returns once closed.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub(crate) fn input_receiver(&self) -> watch::Receiver<bool> {
        self.inner.input_closed.subscribe()
    }
}

fn set_once(flag: &watch::Sender<bool>) -> bool {
    flag.send_if_modified(|value| {
        if *value {
            false
        } else {
            *value = true;
            true
        }
    })
}
