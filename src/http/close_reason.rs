//! Keep-alive decisions.

use http::{header, HeaderMap, Version};

use super::part::{RequestHead, ResponseHead};

/// Reasons for closing a connection after a request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// HTTP/1.0 request without `connection: keep-alive`.
    Http10,

    /// Client sent `connection: close`.
    ClientConnectionClose,

    /// Responder sent `connection: close`.
    ServerConnectionClose,
}

impl CloseReason {
    pub fn explain(&self) -> &'static str {
        match self {
            CloseReason::Http10 => "version is http1.0",
            CloseReason::ClientConnectionClose => "client sent Connection: close",
            CloseReason::ServerConnectionClose => "server sent Connection: close",
        }
    }

    /// Why the client's request ends the connection, if it does.
    pub fn from_request(request: &RequestHead) -> Option<CloseReason> {
        if has_connection_token(&request.headers, "close") {
            return Some(CloseReason::ClientConnectionClose);
        }

        if request.version == Version::HTTP_10
            && !has_connection_token(&request.headers, "keep-alive")
        {
            return Some(CloseReason::Http10);
        }

        None
    }

    /// Why the responder's response ends the connection, if it does.
    pub fn from_response(response: &ResponseHead) -> Option<CloseReason> {
        has_connection_token(&response.headers, "close").then_some(CloseReason::ServerConnectionClose)
    }
}

/// Whether any `connection` header carries `token` (comma separated, case-insensitive).
pub(crate) fn has_connection_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}
