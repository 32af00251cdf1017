//! Requests handed to the responder.
//!
//! # Responsibilities
//! - Pair a parsed head with a lazy view of the request body
//! - Keep the body single-pass: reading it advances the connection
//!
//! # Design Decisions
//! - The body borrows the connection's inbound reader for the request's
//!   lifetime, so a second body view over the same connection cannot exist
//! - Whatever the responder leaves unread is drained by the pipeline

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, Uri, Version};

use crate::error::Error;
use crate::pipeline::stream::Inbound;

use super::part::{RequestHead, RequestPart};

/// An inbound request whose body is read on demand.
#[derive(Debug)]
pub struct Request<'c> {
    head: RequestHead,
    body: RequestBody<'c>,
}

impl<'c> Request<'c> {
    pub(crate) fn new(head: RequestHead, inbound: &'c mut Inbound) -> Self {
        Self {
            head,
            body: RequestBody {
                inbound,
                ended: false,
                trailers: None,
            },
        }
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn body(&mut self) -> &mut RequestBody<'c> {
        &mut self.body
    }

    pub fn into_parts(self) -> (RequestHead, RequestBody<'c>) {
        (self.head, self.body)
    }
}

/// One-shot view of a request body over the connection's inbound parts.
#[derive(Debug)]
pub struct RequestBody<'c> {
    inbound: &'c mut Inbound,
    ended: bool,
    trailers: Option<HeaderMap>,
}

impl RequestBody<'_> {
    /// Next chunk of the body, or `None` once the request has ended.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, Error> {
        if self.ended {
            return Ok(None);
        }

        match self.inbound.next_part().await? {
            Some(RequestPart::BodyChunk(bytes)) => Ok(Some(bytes)),
            Some(RequestPart::End(trailers)) => {
                self.ended = true;
                self.trailers = trailers;
                Ok(None)
            }
            Some(part) => {
                // Leave the head for the pipeline to find.
                self.ended = true;
                let kind = part.kind();
                self.inbound.push_back(part);
                Err(Error::UnexpectedPart(kind))
            }
            None => {
                self.ended = true;
                Err(Error::IncompleteMessage)
            }
        }
    }

    /// Read the rest of the body into one buffer.
    pub async fn to_bytes(&mut self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Whether the end of the request has been read.
    pub fn is_end(&self) -> bool {
        self.ended
    }

    /// Trailing headers, available once the end has been read.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }
}
