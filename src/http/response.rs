//! Responses and the response body writer.
//!
//! # Responsibilities
//! - Carry status, headers and a body produced by the responder
//! - Stream the body as chunks through a [`BodyWriter`]
//! - Hand trailing headers back to the pipeline, which writes the `End`
//!
//! # Design Decisions
//! - The body never writes the terminator itself, so trailers land on the
//!   `End` part however many chunks were written, including none

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::error::{BoxError, Error};
use crate::pipeline::stream::Outbound;

use super::part::{ResponseHead, ResponsePart};

/// A response produced by a responder.
pub struct Response {
    pub head: ResponseHead,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: StatusCode, body: ResponseBody) -> Self {
        Self {
            head: ResponseHead::new(status),
            body,
        }
    }

    /// A response with a fixed body and a matching `content-length`.
    pub fn full(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(status, ResponseBody::Full(body.clone()))
            .with_header(header::CONTENT_LENGTH, HeaderValue::from(body.len()))
    }

    /// A response without a body.
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, ResponseBody::Empty)
    }

    /// Add a header, replacing any existing value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.head.headers.insert(name, value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.head.headers
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("head", &self.head)
            .field("body", &self.body)
            .finish()
    }
}

/// A body that writes itself, returning trailing headers when done.
pub trait WriteBody: Send {
    fn write_body<'a>(
        self: Box<Self>,
        writer: &'a mut BodyWriter<'_>,
    ) -> BoxFuture<'a, Result<Option<HeaderMap>, Error>>;
}

/// Body of a [`Response`].
pub enum ResponseBody {
    Empty,
    Full(Bytes),
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
    /// Custom writer; the only variant that can produce trailers.
    Custom(Box<dyn WriteBody>),
}

impl ResponseBody {
    pub fn custom(body: impl WriteBody + 'static) -> Self {
        ResponseBody::Custom(Box::new(body))
    }

    /// Write the body through `writer`, returning its trailers.
    pub(crate) async fn write_to(
        self,
        writer: &mut BodyWriter<'_>,
    ) -> Result<Option<HeaderMap>, Error> {
        match self {
            ResponseBody::Empty => Ok(None),
            ResponseBody::Full(bytes) => {
                writer.write(bytes).await?;
                Ok(None)
            }
            ResponseBody::Stream(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    writer.write(chunk.map_err(Error::Application)?).await?;
                }
                Ok(None)
            }
            ResponseBody::Custom(body) => body.write_body(writer).await,
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "Empty"),
            ResponseBody::Full(b) => write!(f, "Full({} bytes)", b.len()),
            ResponseBody::Stream(_) => write!(f, "Stream"),
            ResponseBody::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(value: Bytes) -> Self {
        ResponseBody::Full(value)
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        ResponseBody::Full(Bytes::from(value))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        ResponseBody::Full(Bytes::from_static(value.as_bytes()))
    }
}

/// Writes response body chunks to the connection.
#[derive(Debug)]
pub struct BodyWriter<'o> {
    outbound: &'o mut Outbound,
    written: u64,
}

impl<'o> BodyWriter<'o> {
    pub(crate) fn new(outbound: &'o mut Outbound) -> Self {
        Self {
            outbound,
            written: 0,
        }
    }

    /// Write one chunk. Empty chunks are skipped.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), Error> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.written += chunk.len() as u64;
        self.outbound.write(ResponsePart::BodyChunk(chunk)).await
    }

    /// Body bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use crate::net::handle::ConnectionHandle;
    use futures_util::{sink, stream, FutureExt};
    use tokio::sync::mpsc;

    fn outbound() -> (Outbound, mpsc::UnboundedReceiver<ResponsePart>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = sink::unfold(
            tx,
            |tx: mpsc::UnboundedSender<ResponsePart>, part: ResponsePart| async move {
                tx.send(part).map_err(|_| Error::ConnectionClosed)?;
                Ok::<_, Error>(tx)
            },
        );
        let handle = ConnectionHandle::new(ConnectionId::new(), None);
        (Outbound::new(Box::pin(sink), handle), rx)
    }

    #[test]
    fn full_sets_content_length() {
        let response = Response::full(StatusCode::OK, "hello");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        assert!(matches!(response.body, ResponseBody::Full(ref b) if b == "hello"));
    }

    #[tokio::test]
    async fn stream_body_skips_empty_chunks() {
        let (mut outbound, mut rx) = outbound();
        let body = ResponseBody::Stream(
            stream::iter(vec![
                Ok(Bytes::from_static(b"ab")),
                Ok(Bytes::new()),
                Ok(Bytes::from_static(b"c")),
            ])
            .boxed(),
        );

        let mut writer = BodyWriter::new(&mut outbound);
        assert!(body.write_to(&mut writer).await.unwrap().is_none());
        assert_eq!(writer.bytes_written(), 3);
        drop(outbound);

        let mut kinds = Vec::new();
        while let Some(part) = rx.recv().await {
            kinds.push(part.kind());
        }
        assert_eq!(kinds, ["body chunk", "body chunk"]);
    }

    #[tokio::test]
    async fn stream_body_failure_is_application_error() {
        let (mut outbound, _rx) = outbound();
        let body = ResponseBody::Stream(
            stream::iter(vec![Err::<Bytes, BoxError>("upstream reset".into())]).boxed(),
        );

        let err = body
            .write_to(&mut BodyWriter::new(&mut outbound))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Application(_)));
    }

    struct Counted;

    impl WriteBody for Counted {
        fn write_body<'a>(
            self: Box<Self>,
            writer: &'a mut BodyWriter<'_>,
        ) -> BoxFuture<'a, Result<Option<HeaderMap>, Error>> {
            async move {
                writer.write(Bytes::from_static(b"xyz")).await?;
                let mut trailers = HeaderMap::new();
                trailers.insert("x-length", HeaderValue::from(writer.bytes_written()));
                Ok(Some(trailers))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn custom_body_returns_trailers() {
        let (mut outbound, _rx) = outbound();
        let trailers = ResponseBody::custom(Counted)
            .write_to(&mut BodyWriter::new(&mut outbound))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trailers["x-length"], "3");
    }
}
