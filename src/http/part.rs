//! Protocol parts exchanged over one connection.
//!
//! A message on the wire is always one `Head`, zero or more `BodyChunk`s and
//! exactly one `End`. Both directions use the same shape.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri, Version};

/// Request metadata: everything before the body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }
}

/// Response metadata: status line and headers.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
        }
    }
}

/// One inbound part of a request.
#[derive(Debug, Clone)]
pub enum RequestPart {
    Head(RequestHead),
    BodyChunk(Bytes),
    /// Terminates the request, with optional trailing headers.
    End(Option<HeaderMap>),
}

impl RequestPart {
    /// Short name of the part, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RequestPart::Head(_) => "head",
            RequestPart::BodyChunk(_) => "body chunk",
            RequestPart::End(_) => "end",
        }
    }
}

/// One outbound part of a response.
#[derive(Debug, Clone)]
pub enum ResponsePart {
    Head(ResponseHead),
    BodyChunk(Bytes),
    /// Terminates the response, with optional trailing headers.
    End(Option<HeaderMap>),
}

impl ResponsePart {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponsePart::Head(_) => "head",
            ResponsePart::BodyChunk(_) => "body chunk",
            ResponsePart::End(_) => "end",
        }
    }
}
