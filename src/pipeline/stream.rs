//! Part stream adapter.
//!
//! Wraps the raw inbound sequence of [`RequestPart`]s into a suspendable
//! reader that honors half-close and supports pushing one part back, and the
//! outbound sink into a writer of [`ResponsePart`]s that refuses writes once
//! the connection is closed.

use std::pin::Pin;

use futures_util::sink::Sink;
use futures_util::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;

use crate::error::Error;
use crate::http::part::{RequestPart, ResponsePart};
use crate::net::handle::ConnectionHandle;

/// Inbound side of a connection as produced by a transport.
pub type PartStream = BoxStream<'static, Result<RequestPart, Error>>;

/// Outbound side of a connection as accepted by a transport.
pub type PartSink = Pin<Box<dyn Sink<ResponsePart, Error = Error> + Send>>;

/// Single-consumer reader over the inbound parts.
pub struct Inbound {
    parts: PartStream,
    pending: Option<RequestPart>,
    input_closed: watch::Receiver<bool>,
    finished: bool,
}

impl Inbound {
    pub fn new(parts: PartStream, handle: &ConnectionHandle) -> Self {
        Self {
            parts,
            pending: None,
            input_closed: handle.input_receiver(),
            finished: false,
        }
    }

    /// Read the next part. `Ok(None)` is end of stream.
    ///
    /// A read that is suspended when the input is closed resolves to end of
    /// stream. Once the stream has ended or failed, it stays ended.
    pub async fn next_part(&mut self) -> Result<Option<RequestPart>, Error> {
        if self.finished || *self.input_closed.borrow() {
            self.finished = true;
            return Ok(None);
        }

        if let Some(part) = self.pending.take() {
            return Ok(Some(part));
        }

        let next = tokio::select! {
            biased;
            // Err means every handle is gone; that is not a half-close.
            Ok(_) = self.input_closed.wait_for(|closed| *closed) => None,
            part = self.parts.next() => part,
        };

        match next {
            Some(Ok(part)) => Ok(Some(part)),
            Some(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Return a part so the next read yields it again.
    pub(crate) fn push_back(&mut self, part: RequestPart) {
        debug_assert!(self.pending.is_none(), "only one part can be pushed back");
        self.pending = Some(part);
    }
}

impl std::fmt::Debug for Inbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbound")
            .field("pending", &self.pending.as_ref().map(RequestPart::kind))
            .field("finished", &self.finished)
            .finish()
    }
}

/// Writer of response parts.
pub struct Outbound {
    sink: PartSink,
    handle: ConnectionHandle,
    sink_closed: bool,
}

impl Outbound {
    pub fn new(sink: PartSink, handle: ConnectionHandle) -> Self {
        Self {
            sink,
            handle,
            sink_closed: false,
        }
    }

    /// Write one part. Heads are buffered; chunks and ends flush.
    pub async fn write(&mut self, part: ResponsePart) -> Result<(), Error> {
        if self.sink_closed || self.handle.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        match part {
            ResponsePart::Head(_) => self.sink.feed(part).await,
            _ => self.sink.send(part).await,
        }
    }

    /// Flush and close the sink. Only the first call reaches the transport.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.sink_closed {
            return Ok(());
        }
        self.sink_closed = true;
        self.sink.close().await
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound")
            .field("sink_closed", &self.sink_closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::ConnectionId;
    use bytes::Bytes;
    use futures_util::stream;
    use std::time::Duration;

    fn handle() -> ConnectionHandle {
        ConnectionHandle::new(ConnectionId::new(), None)
    }

    fn chunk(s: &'static str) -> Result<RequestPart, Error> {
        Ok(RequestPart::BodyChunk(Bytes::from_static(s.as_bytes())))
    }

    #[tokio::test]
    async fn pushed_back_part_is_read_again() {
        let handle = handle();
        let mut inbound = Inbound::new(stream::iter(vec![chunk("a")]).boxed(), &handle);

        let part = inbound.next_part().await.unwrap().unwrap();
        inbound.push_back(part);

        assert!(matches!(
            inbound.next_part().await.unwrap(),
            Some(RequestPart::BodyChunk(_))
        ));
        assert!(inbound.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stays_ended_after_error() {
        let handle = handle();
        let parts = vec![Err(Error::ChunkExpectedCrLf), chunk("late")];
        let mut inbound = Inbound::new(stream::iter(parts).boxed(), &handle);

        assert!(inbound.next_part().await.is_err());
        assert!(inbound.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_handle_does_not_end_input() {
        let mut inbound = {
            let handle = handle();
            Inbound::new(stream::iter(vec![chunk("a"), chunk("b")]).boxed(), &handle)
        };

        assert!(inbound.next_part().await.unwrap().is_some());
        assert!(inbound.next_part().await.unwrap().is_some());
        assert!(inbound.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closing_input_ends_a_suspended_read() {
        let handle = handle();
        let mut inbound = Inbound::new(stream::pending::<Result<RequestPart, Error>>().boxed(), &handle);

        let closer = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close_input();
        });

        let part = tokio::time::timeout(Duration::from_secs(1), inbound.next_part())
            .await
            .expect("read was not woken by half-close")
            .unwrap();
        assert!(part.is_none());
    }
}
