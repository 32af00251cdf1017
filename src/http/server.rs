//! HTTP/1.1 server: accept loop and connection supervision.
//!
//! # Responsibilities
//! - Accept connections through the bounded [`Listener`]
//! - Run each connection's pipeline in its own task
//! - Broadcast shutdown, wait out the grace period, abort what is left

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};

use crate::config::{LimitsConfig, ServerConfig};
use crate::http::responder::Responder;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::handle::ConnectionHandle;
use crate::net::listener::Listener;
use crate::pipeline::Connection;

/// Serves one [`Responder`] on every accepted connection.
#[derive(Debug)]
pub struct HttpServer<R> {
    responder: Arc<R>,
    limits: LimitsConfig,
    grace: Duration,
    tracker: ConnectionTracker,
}

impl<R: Responder + 'static> HttpServer<R> {
    pub fn new(config: &ServerConfig, responder: R) -> Self {
        Self {
            responder: Arc::new(responder),
            limits: config.limits.clone(),
            grace: Duration::from_secs(config.shutdown.grace_secs),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Live connection accounting.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept and serve connections until `shutdown` is triggered, then drain.
    ///
    /// Idle connections close right away on shutdown and busy ones after
    /// their current response. Connections still open when the grace period
    /// ends are aborted.
    pub async fn run(&self, listener: Listener, shutdown: &Shutdown) {
        let mut stop = shutdown.subscribe();
        let mut tasks = JoinSet::new();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "HTTP server starting");
        }

        loop {
            tokio::select! {
                _ = stop.recv() => break,
                accepted = listener.accept() => {
                    let (stream, peer_addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let guard = self.tracker.track();
                    let handle = ConnectionHandle::new(guard.id(), Some(peer_addr));
                    let connection = Connection::from_io(stream, handle, &self.limits);
                    let responder = Arc::clone(&self.responder);
                    let signal = shutdown.subscribe();

                    tasks.spawn(async move {
                        let _permit = permit;
                        let _guard = guard;
                        // Failures are already logged by the connection.
                        let _ = connection.serve(&responder, signal).await;
                    });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
            }
        }

        drop(listener);
        // Connections accepted while the signal was in flight subscribed too late.
        shutdown.trigger();

        tracing::info!(
            active_connections = tasks.len(),
            grace_secs = self.grace.as_secs(),
            "Shutting down, draining connections"
        );

        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = tasks.join_next().await {
                log_join(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                "Grace period elapsed, aborting connections"
            );
            tasks.shutdown().await;
        }

        tracing::info!("HTTP server stopped");
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Connection task panicked");
        }
    }
}
