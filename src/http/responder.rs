//! The application collaborator that turns requests into responses.

use std::future::Future;
use std::sync::Arc;

use crate::error::BoxError;
use crate::net::handle::ConnectionHandle;

use super::request::Request;
use super::response::Response;

/// Produces a response for one request.
///
/// Invoked at most once at a time per connection, possibly concurrently
/// across connections. The request body is only readable until the returned
/// future completes; whatever is left unread is discarded by the pipeline.
/// An `Err` terminates the connection without a response, so error pages
/// belong in the responder itself.
pub trait Responder: Send + Sync {
    fn respond<'a>(
        &'a self,
        request: Request<'a>,
        conn: &'a ConnectionHandle,
    ) -> impl Future<Output = Result<Response, BoxError>> + Send + 'a;
}

impl<R: Responder> Responder for Arc<R> {
    fn respond<'a>(
        &'a self,
        request: Request<'a>,
        conn: &'a ConnectionHandle,
    ) -> impl Future<Output = Result<Response, BoxError>> + Send + 'a {
        (**self).respond(request, conn)
    }
}
