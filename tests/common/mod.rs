//! Shared utilities for pipeline and server tests.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, Sink, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use tokio::sync::{mpsc, Notify};

use http_pipeline::error::{BoxError, Error};
use http_pipeline::http::part::{RequestHead, RequestPart, ResponsePart};
use http_pipeline::http::response::{BodyWriter, ResponseBody, WriteBody};
use http_pipeline::net::{ConnectionHandle, ConnectionId};
use http_pipeline::pipeline::{Connection, PartStream};
use http_pipeline::{Request, Responder, Response};

pub fn head(path: &'static str) -> RequestPart {
    RequestPart::Head(RequestHead::new(Method::GET, Uri::from_static(path)))
}

pub fn head_with(path: &'static str, name: HeaderName, value: &'static str) -> RequestPart {
    let mut head = RequestHead::new(Method::POST, Uri::from_static(path));
    head.headers.insert(name, HeaderValue::from_static(value));
    RequestPart::Head(head)
}

pub fn chunk(data: &'static str) -> RequestPart {
    RequestPart::BodyChunk(Bytes::from_static(data.as_bytes()))
}

pub fn end() -> RequestPart {
    RequestPart::End(None)
}

/// Inbound parts that end once the list is exhausted.
pub fn scripted(parts: Vec<RequestPart>) -> PartStream {
    stream::iter(parts.into_iter().map(Ok)).boxed()
}

/// Inbound parts fed by the test; dropping the sender ends the stream.
pub fn fed() -> (mpsc::UnboundedSender<RequestPart>, PartStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let parts = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|part| (Ok(part), rx))
    })
    .boxed();
    (tx, parts)
}

/// What a [`RecordingSink`] has seen.
#[derive(Debug, Clone, Default)]
pub struct Recording(Arc<Mutex<Recorded>>);

#[derive(Debug, Default)]
struct Recorded {
    parts: Vec<ResponsePart>,
    closes: usize,
}

impl Recording {
    pub fn parts(&self) -> Vec<ResponsePart> {
        self.0.lock().unwrap().parts.clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.0
            .lock()
            .unwrap()
            .parts
            .iter()
            .map(ResponsePart::kind)
            .collect()
    }

    pub fn ends(&self) -> usize {
        self.kinds().iter().filter(|k| **k == "end").count()
    }

    pub fn closes(&self) -> usize {
        self.0.lock().unwrap().closes
    }
}

/// Outbound sink that records every part and counts closes.
pub struct RecordingSink(Recording);

impl RecordingSink {
    pub fn new() -> (Self, Recording) {
        let recording = Recording::default();
        (Self(recording.clone()), recording)
    }
}

impl Sink<ResponsePart> for RecordingSink {
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: ResponsePart) -> Result<(), Error> {
        self.0 .0.lock().unwrap().parts.push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        self.0 .0.lock().unwrap().closes += 1;
        Poll::Ready(Ok(()))
    }
}

/// A connection over in-memory parts, with its handle and outbound recording.
pub fn connection(parts: PartStream) -> (Connection, ConnectionHandle, Recording) {
    let (sink, recording) = RecordingSink::new();
    let handle = ConnectionHandle::new(ConnectionId::new(), None);
    let connection = Connection::new(parts, Box::pin(sink), handle.clone());
    (connection, handle, recording)
}

/// Answers `200 ok` without touching the request body.
#[derive(Debug, Default)]
pub struct CountingResponder {
    calls: AtomicUsize,
}

impl CountingResponder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Responder for CountingResponder {
    async fn respond<'a>(
        &'a self,
        _request: Request<'a>,
        _conn: &'a ConnectionHandle,
    ) -> Result<Response, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Response::full(StatusCode::OK, "ok"))
    }
}

/// Holds each request until released.
#[derive(Debug, Default)]
pub struct GatedResponder {
    pub started: Notify,
    pub release: Notify,
}

impl Responder for GatedResponder {
    async fn respond<'a>(
        &'a self,
        _request: Request<'a>,
        _conn: &'a ConnectionHandle,
    ) -> Result<Response, BoxError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(Response::new(StatusCode::OK, "released".into()))
    }
}

/// Body with no chunks and fixed trailers.
pub struct TrailersOnly(pub HeaderMap);

impl WriteBody for TrailersOnly {
    fn write_body<'a>(
        self: Box<Self>,
        _writer: &'a mut BodyWriter<'_>,
    ) -> BoxFuture<'a, Result<Option<HeaderMap>, Error>> {
        async move { Ok(Some(self.0)) }.boxed()
    }
}

/// Responds with [`TrailersOnly`].
pub struct TrailerResponder(pub HeaderMap);

impl Responder for TrailerResponder {
    async fn respond<'a>(
        &'a self,
        _request: Request<'a>,
        _conn: &'a ConnectionHandle,
    ) -> Result<Response, BoxError> {
        Ok(Response::new(
            StatusCode::OK,
            ResponseBody::custom(TrailersOnly(self.0.clone())),
        ))
    }
}

/// Streams `hello` with no declared length.
#[derive(Debug, Default)]
pub struct StreamResponder;

impl Responder for StreamResponder {
    async fn respond<'a>(
        &'a self,
        _request: Request<'a>,
        _conn: &'a ConnectionHandle,
    ) -> Result<Response, BoxError> {
        let chunks = stream::iter(vec![
            Ok::<_, BoxError>(Bytes::from_static(b"hel")),
            Ok(Bytes::from_static(b"lo")),
        ]);
        Ok(Response::new(StatusCode::OK, ResponseBody::Stream(chunks.boxed())))
    }
}

/// Answers with `connection: close`.
#[derive(Debug, Default)]
pub struct ClosingResponder;

impl Responder for ClosingResponder {
    async fn respond<'a>(
        &'a self,
        _request: Request<'a>,
        _conn: &'a ConnectionHandle,
    ) -> Result<Response, BoxError> {
        Ok(Response::full(StatusCode::OK, "bye")
            .with_header(http::header::CONNECTION, HeaderValue::from_static("close")))
    }
}

/// Echoes the request body back.
#[derive(Debug, Default)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    async fn respond<'a>(
        &'a self,
        mut request: Request<'a>,
        _conn: &'a ConnectionHandle,
    ) -> Result<Response, BoxError> {
        let body = request.body().to_bytes().await?;
        Ok(Response::full(StatusCode::OK, body))
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
