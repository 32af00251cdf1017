//! The per-connection request loop.
//!
//! ```text
//!   Start ──read──▶ Dispatch ──▶ Respond ──▶ Write ──▶ Keep-alive? ──▶ Release ──▶ Drain
//!                      ▲                                   │              │          │
//!                      │                                 close        Cancelled      │
//!                      └──────────────── next head ◀─────────────────────────────────┘
//! ```
//!
//! Dispatch and Release are the only points where the loop touches the
//! shared [`StateCell`]; both are single exchanges.

use std::time::Instant;

use http::{header, HeaderValue, Version};

use crate::error::Error;
use crate::http::close_reason::CloseReason;
use crate::http::part::{RequestHead, RequestPart, ResponseHead, ResponsePart};
use crate::http::request::Request;
use crate::http::responder::Responder;
use crate::http::response::{BodyWriter, Response};
use crate::net::connection::{ConnectionState, StateCell};
use crate::net::handle::ConnectionHandle;
use crate::observability::metrics;

use super::stream::{Inbound, Outbound};

/// How a connection's pipeline came to an end without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The peer finished sending requests.
    EndOfStream,
    /// A response was written and the exchange asked for the connection to close.
    Closed(CloseReason),
    /// Shutdown claimed the connection; no further request was started.
    Cancelled,
    /// The connection was closed from outside, possibly mid-request.
    Aborted,
}

pub(crate) async fn run<R: Responder>(
    inbound: &mut Inbound,
    outbound: &mut Outbound,
    responder: &R,
    state: &StateCell,
    handle: &ConnectionHandle,
) -> Result<Termination, Error> {
    let mut head = match inbound.next_part().await? {
        None => return Ok(Termination::EndOfStream),
        Some(RequestPart::Head(head)) => head,
        Some(part) => return Err(Error::UnexpectedPart(part.kind())),
    };

    loop {
        let previous = state.exchange(ConnectionState::Processing);
        if previous != ConnectionState::Idle {
            tracing::trace!(connection_id = %handle.id(), ?previous, "Not dispatching request");
            return Ok(Termination::Cancelled);
        }

        if let Some(reason) = respond(head, inbound, outbound, responder, handle).await? {
            tracing::debug!(
                connection_id = %handle.id(),
                close_reason = reason.explain(),
                "Closing connection after response"
            );
            return Ok(Termination::Closed(reason));
        }

        let previous = state.exchange(ConnectionState::Idle);
        if previous != ConnectionState::Processing {
            tracing::trace!(connection_id = %handle.id(), ?previous, "Stopping after response");
            return Ok(Termination::Cancelled);
        }

        head = match drain(inbound).await? {
            Some(head) => head,
            None => return Ok(Termination::EndOfStream),
        };
    }
}

/// Invoke the responder and write its response as `Head, BodyChunk*, End`.
///
/// Returns the reason to close the connection afterwards, if any.
async fn respond<R: Responder>(
    head: RequestHead,
    inbound: &mut Inbound,
    outbound: &mut Outbound,
    responder: &R,
    handle: &ConnectionHandle,
) -> Result<Option<CloseReason>, Error> {
    let started = Instant::now();
    let request_version = head.version;
    let client_close = CloseReason::from_request(&head);

    tracing::debug!(
        connection_id = %handle.id(),
        method = %head.method,
        uri = %head.uri,
        "Dispatching request"
    );

    let Response {
        head: mut response_head,
        body,
    } = responder
        .respond(Request::new(head, inbound), handle)
        .await
        .map_err(Error::Application)?;

    if request_version == Version::HTTP_10 {
        answer_as_http10(&mut response_head);
    }

    // The request's reason wins when both sides ask to close.
    let close_reason = client_close.or_else(|| CloseReason::from_response(&response_head));
    let status = response_head.status;

    outbound.write(ResponsePart::Head(response_head)).await?;
    let trailers = body.write_to(&mut BodyWriter::new(outbound)).await?;
    outbound.write(ResponsePart::End(trailers)).await?;

    metrics::record_request(status, started);

    Ok(close_reason)
}

/// HTTP/1.0 peers cannot read chunked bodies; a body without a length is
/// delimited by closing the connection instead.
fn answer_as_http10(response: &mut ResponseHead) {
    response.version = Version::HTTP_10;
    if !response.headers.contains_key(header::CONTENT_LENGTH) {
        response.headers.remove(header::TRANSFER_ENCODING);
        response
            .headers
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
}

/// Discard what the responder left of the request body and read the next head.
///
/// A clean end of stream right after the request yields `None`.
async fn drain(inbound: &mut Inbound) -> Result<Option<RequestHead>, Error> {
    let mut part = loop {
        match inbound.next_part().await? {
            Some(RequestPart::BodyChunk(_)) => continue,
            other => break other,
        }
    };

    if let Some(RequestPart::End(_)) = part {
        part = inbound.next_part().await?;
    }

    match part {
        None => Ok(None),
        Some(RequestPart::Head(head)) => Ok(Some(head)),
        Some(other) => Err(Error::UnexpectedPart(other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use bytes::Bytes;
    use futures_util::{stream, StreamExt};
    use http::{Method, Uri};

    fn inbound_of(parts: Vec<RequestPart>) -> Inbound {
        let handle = ConnectionHandle::new(ConnectionId::new(), None);
        Inbound::new(stream::iter(parts.into_iter().map(Ok)).boxed(), &handle)
    }

    fn head(path: &'static str) -> RequestPart {
        RequestPart::Head(RequestHead::new(Method::GET, Uri::from_static(path)))
    }

    fn chunk() -> RequestPart {
        RequestPart::BodyChunk(Bytes::from_static(b"unread"))
    }

    #[test]
    fn http10_answer_without_length_closes() {
        let mut response = ResponseHead::new(http::StatusCode::OK);
        response.headers.insert(
            header::TRANSFER_ENCODING,
            HeaderValue::from_static("chunked"),
        );
        answer_as_http10(&mut response);

        assert_eq!(response.version, Version::HTTP_10);
        assert!(!response.headers.contains_key(header::TRANSFER_ENCODING));
        assert_eq!(
            CloseReason::from_response(&response),
            Some(CloseReason::ServerConnectionClose)
        );
    }

    #[test]
    fn http10_answer_with_length_stays_open() {
        let mut response = ResponseHead::new(http::StatusCode::OK);
        response
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("2"));
        answer_as_http10(&mut response);

        assert_eq!(response.version, Version::HTTP_10);
        assert_eq!(CloseReason::from_response(&response), None);
    }

    #[tokio::test]
    async fn drain_skips_chunks_and_end() {
        let mut inbound = inbound_of(vec![chunk(), chunk(), RequestPart::End(None), head("/next")]);
        let next = drain(&mut inbound).await.unwrap().unwrap();
        assert_eq!(next.uri, "/next");
    }

    #[tokio::test]
    async fn drain_after_fully_read_body_finds_head() {
        let mut inbound = inbound_of(vec![head("/next")]);
        let next = drain(&mut inbound).await.unwrap().unwrap();
        assert_eq!(next.uri, "/next");
    }

    #[tokio::test]
    async fn drain_end_of_stream_is_clean() {
        let mut inbound = inbound_of(vec![chunk(), RequestPart::End(None)]);
        assert!(drain(&mut inbound).await.unwrap().is_none());

        let mut inbound = inbound_of(vec![]);
        assert!(drain(&mut inbound).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn drain_rejects_part_where_head_is_required() {
        let mut inbound = inbound_of(vec![RequestPart::End(None), chunk()]);
        let err = drain(&mut inbound).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedPart("body chunk")));

        let mut inbound = inbound_of(vec![RequestPart::End(None), RequestPart::End(None)]);
        let err = drain(&mut inbound).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedPart("end")));
    }
}
