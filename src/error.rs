//! Error types for the connection pipeline.

use std::io;

/// Boxed error returned by responders and streamed response bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for the connection pipeline and its wire codec.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A part arrived where the framing does not allow it.
    #[error("unexpected {0} part")]
    UnexpectedPart(&'static str),

    /// The connection was closed underneath the pipeline.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("http parse fail: {0}")]
    HttpParse(String),

    #[error("request head larger than {0} bytes")]
    HeadTooLarge(usize),

    #[error("http parse resulted in too many headers")]
    TooManyHeaders,

    #[error("unsupported http version")]
    UnsupportedVersion,

    #[error("bad header: {0}")]
    BadHeader(String),

    #[error("content-length header not a number")]
    BadContentLength,

    #[error("chunk length cannot be read as a number")]
    ChunkLenNotANumber,

    #[error("chunk expected crlf as next character")]
    ChunkExpectedCrLf,

    /// Peer closed the transport in the middle of a message.
    #[error("peer closed connection mid-message")]
    IncompleteMessage,

    /// The responder (or a response body it produced) failed.
    #[error("responder failed: {0}")]
    Application(BoxError),

    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),
}

/// Coarse classification of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The peer violated HTTP framing.
    Protocol,
    /// Reading or writing the transport failed.
    Transport,
    /// The application failed to produce a response.
    Application,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Protocol => "protocol",
            ErrorClass::Transport => "transport",
            ErrorClass::Application => "application",
        }
    }
}

impl Error {
    /// Classify this error for logging and metrics.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::UnexpectedPart(_)
            | Error::HttpParse(_)
            | Error::HeadTooLarge(_)
            | Error::TooManyHeaders
            | Error::UnsupportedVersion
            | Error::BadHeader(_)
            | Error::BadContentLength
            | Error::ChunkLenNotANumber
            | Error::ChunkExpectedCrLf => ErrorClass::Protocol,
            Error::ConnectionClosed
            | Error::Io(_)
            | Error::IncompleteMessage
            | Error::Bind(_) => ErrorClass::Transport,
            Error::Application(_) => ErrorClass::Application,
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        match value {
            httparse::Error::TooManyHeaders => Error::TooManyHeaders,
            httparse::Error::Version => Error::UnsupportedVersion,
            other => Error::HttpParse(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_protocol_violations() {
        assert_eq!(Error::UnexpectedPart("end").class(), ErrorClass::Protocol);
        assert_eq!(Error::ChunkExpectedCrLf.class(), ErrorClass::Protocol);
    }

    #[test]
    fn classifies_transport_failures() {
        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.class(), ErrorClass::Transport);
        assert_eq!(Error::ConnectionClosed.class(), ErrorClass::Transport);
    }

    #[test]
    fn application_failure_keeps_source_message() {
        let err = Error::Application("handler exploded".into());
        assert_eq!(err.class(), ErrorClass::Application);
        assert_eq!(err.to_string(), "responder failed: handler exploded");
    }

    #[test]
    fn from_httparse_error() {
        assert!(matches!(
            Error::from(httparse::Error::TooManyHeaders),
            Error::TooManyHeaders
        ));
        assert!(matches!(
            Error::from(httparse::Error::HeaderName),
            Error::HttpParse(_)
        ));
    }
}
