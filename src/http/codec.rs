//! HTTP/1.1 framing over a byte transport.
//!
//! # Responsibilities
//! - Decode request heads, content-length and chunked bodies into parts
//! - Encode response parts, chunking bodies of unknown length
//! - Expose both as the part stream and sink the pipeline consumes
//!
//! # Design Decisions
//! - The decoder stops at the first error; later reads see end of stream
//! - Trailers can only travel on chunked responses; otherwise they are dropped

use bytes::{Buf, Bytes, BytesMut};
use futures_util::{sink, stream, StreamExt};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, WriteHalf};

use crate::config::LimitsConfig;
use crate::error::Error;
use crate::pipeline::stream::{PartSink, PartStream};

use super::part::{RequestHead, RequestPart, ResponseHead, ResponsePart};

/// Longest chunk-size line we accept, extensions included.
const MAX_CHUNK_LINE: usize = 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Split a transport into an inbound part stream and an outbound part sink.
pub fn split<IO>(io: IO, limits: &LimitsConfig) -> (PartStream, PartSink)
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(io);
    let decoder = Decoder::new(reader, limits.max_head_bytes, limits.max_headers);
    let encoder = Encoder::new(writer);

    let parts = stream::unfold(decoder, |mut decoder| async move {
        decoder
            .next_part()
            .await
            .transpose()
            .map(|part| (part, decoder))
    })
    .boxed();

    let sink: PartSink = Box::pin(sink::unfold(
        encoder,
        |mut encoder: Encoder<WriteHalf<IO>>, part: ResponsePart| async move {
            encoder.write_part(part).await?;
            Ok::<_, Error>(encoder)
        },
    ));

    (parts, sink)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Head,
    /// Bytes left of a content-length body. Zero means the end is next.
    Length(u64),
    ChunkSize,
    ChunkData(u64),
    ChunkDataEnd,
    Trailers,
    Done,
}

/// Reads request parts from a byte stream.
pub struct Decoder<R> {
    io: R,
    buf: BytesMut,
    state: ReadState,
    max_head_bytes: usize,
    max_headers: usize,
}

impl<R: AsyncRead + Unpin> Decoder<R> {
    pub fn new(io: R, max_head_bytes: usize, max_headers: usize) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(READ_CHUNK),
            state: ReadState::Head,
            max_head_bytes,
            max_headers,
        }
    }

    /// Next part, or `None` once the peer closed between messages.
    pub async fn next_part(&mut self) -> Result<Option<RequestPart>, Error> {
        let result = self.read_part().await;
        if result.is_err() {
            self.state = ReadState::Done;
        }
        result
    }

    async fn read_part(&mut self) -> Result<Option<RequestPart>, Error> {
        loop {
            match self.state {
                ReadState::Done => return Ok(None),

                ReadState::Head => {
                    if let Some((head, body)) = self.parse_head()? {
                        self.state = body;
                        return Ok(Some(RequestPart::Head(head)));
                    }
                    if self.buf.len() >= self.max_head_bytes {
                        return Err(Error::HeadTooLarge(self.max_head_bytes));
                    }
                    if self.fill().await? == 0 {
                        if self.buf.is_empty() {
                            self.state = ReadState::Done;
                            return Ok(None);
                        }
                        return Err(Error::IncompleteMessage);
                    }
                }

                ReadState::Length(0) => {
                    self.state = ReadState::Head;
                    return Ok(Some(RequestPart::End(None)));
                }

                ReadState::Length(remaining) => {
                    let chunk = self.take_body(remaining).await?;
                    self.state = ReadState::Length(remaining - chunk.len() as u64);
                    return Ok(Some(RequestPart::BodyChunk(chunk)));
                }

                ReadState::ChunkSize => match self.take_line()? {
                    Some(line) => {
                        let size = parse_chunk_size(&line)?;
                        self.state = if size == 0 {
                            ReadState::Trailers
                        } else {
                            ReadState::ChunkData(size)
                        };
                    }
                    None => self.fill_mid_message().await?,
                },

                ReadState::ChunkData(remaining) => {
                    let chunk = self.take_body(remaining).await?;
                    let left = remaining - chunk.len() as u64;
                    self.state = if left == 0 {
                        ReadState::ChunkDataEnd
                    } else {
                        ReadState::ChunkData(left)
                    };
                    return Ok(Some(RequestPart::BodyChunk(chunk)));
                }

                ReadState::ChunkDataEnd => {
                    if self.buf.len() < 2 {
                        self.fill_mid_message().await?;
                        continue;
                    }
                    if &self.buf[..2] != b"\r\n" {
                        return Err(Error::ChunkExpectedCrLf);
                    }
                    self.buf.advance(2);
                    self.state = ReadState::ChunkSize;
                }

                ReadState::Trailers => {
                    if let Some(trailers) = self.parse_trailers()? {
                        self.state = ReadState::Head;
                        let trailers = (!trailers.is_empty()).then_some(trailers);
                        return Ok(Some(RequestPart::End(trailers)));
                    }
                    if self.buf.len() >= self.max_head_bytes {
                        return Err(Error::HeadTooLarge(self.max_head_bytes));
                    }
                    self.fill_mid_message().await?;
                }
            }
        }
    }

    async fn fill(&mut self) -> Result<usize, Error> {
        self.buf.reserve(READ_CHUNK);
        Ok(self.io.read_buf(&mut self.buf).await?)
    }

    async fn fill_mid_message(&mut self) -> Result<(), Error> {
        if self.fill().await? == 0 {
            return Err(Error::IncompleteMessage);
        }
        Ok(())
    }

    /// Up to `remaining` body bytes, reading if the buffer is empty.
    async fn take_body(&mut self, remaining: u64) -> Result<Bytes, Error> {
        if self.buf.is_empty() {
            self.fill_mid_message().await?;
        }
        let n = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(self.buf.len());
        Ok(self.buf.split_to(n).freeze())
    }

    /// A CRLF-terminated line without its terminator, if buffered.
    fn take_line(&mut self) -> Result<Option<BytesMut>, Error> {
        match self.buf.windows(2).position(|w| w == b"\r\n") {
            Some(pos) => {
                let mut line = self.buf.split_to(pos + 2);
                line.truncate(pos);
                Ok(Some(line))
            }
            None if self.buf.len() > MAX_CHUNK_LINE => Err(Error::ChunkLenNotANumber),
            None => Ok(None),
        }
    }

    fn parse_head(&mut self) -> Result<Option<(RequestHead, ReadState)>, Error> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let mut req = httparse::Request::new(&mut headers);

        let len = match req.parse(&self.buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Ok(None),
        };

        let version = match req.version {
            Some(0) => Version::HTTP_10,
            Some(1) => Version::HTTP_11,
            _ => return Err(Error::UnsupportedVersion),
        };
        let method = Method::from_bytes(req.method.unwrap_or_default().as_bytes())
            .map_err(|e| Error::HttpParse(e.to_string()))?;
        let uri: Uri = req
            .path
            .unwrap_or("/")
            .parse()
            .map_err(|e: http::uri::InvalidUri| Error::HttpParse(e.to_string()))?;
        let headers = to_header_map(req.headers)?;
        let body = body_framing(&headers)?;

        self.buf.advance(len);

        let head = RequestHead {
            method,
            uri,
            version,
            headers,
        };
        Ok(Some((head, body)))
    }

    fn parse_trailers(&mut self) -> Result<Option<HeaderMap>, Error> {
        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let (len, trailers) = match httparse::parse_headers(&self.buf, &mut headers)? {
            httparse::Status::Complete((len, parsed)) => (len, to_header_map(parsed)?),
            httparse::Status::Partial => return Ok(None),
        };
        self.buf.advance(len);
        Ok(Some(trailers))
    }
}

fn to_header_map(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap, Error> {
    let mut map = HeaderMap::with_capacity(parsed.len());
    for h in parsed {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| Error::BadHeader(h.name.to_string()))?;
        let value =
            HeaderValue::from_bytes(h.value).map_err(|_| Error::BadHeader(h.name.to_string()))?;
        map.append(name, value);
    }
    Ok(map)
}

/// How the request body is delimited.
fn body_framing(headers: &HeaderMap) -> Result<ReadState, Error> {
    let mut transfer_encoding = headers
        .get_all(header::TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .peekable();

    if transfer_encoding.peek().is_some() {
        return match transfer_encoding.last() {
            Some(last) if last.eq_ignore_ascii_case("chunked") => Ok(ReadState::ChunkSize),
            _ => Err(Error::BadHeader("transfer-encoding".to_string())),
        };
    }

    let mut length = None;
    for value in headers.get_all(header::CONTENT_LENGTH) {
        let parsed: u64 = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or(Error::BadContentLength)?;
        match length {
            Some(existing) if existing != parsed => return Err(Error::BadContentLength),
            _ => length = Some(parsed),
        }
    }

    Ok(ReadState::Length(length.unwrap_or(0)))
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, Error> {
    let line = std::str::from_utf8(line).map_err(|_| Error::ChunkLenNotANumber)?;
    let size = line.split(';').next().unwrap_or_default().trim();
    if size.is_empty() {
        return Err(Error::ChunkLenNotANumber);
    }
    u64::from_str_radix(size, 16).map_err(|_| Error::ChunkLenNotANumber)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteFraming {
    Chunked,
    /// Length given by the responder; body bytes pass through.
    Raw,
    /// Status forbids a body.
    NoBody,
}

/// Writes response parts to a byte stream.
pub struct Encoder<W: AsyncWrite> {
    io: BufWriter<W>,
    framing: WriteFraming,
}

impl<W: AsyncWrite + Unpin> Encoder<W> {
    pub fn new(io: W) -> Self {
        Self {
            io: BufWriter::new(io),
            framing: WriteFraming::NoBody,
        }
    }

    pub async fn write_part(&mut self, part: ResponsePart) -> Result<(), Error> {
        match part {
            ResponsePart::Head(mut head) => {
                self.framing = response_framing(&mut head);
                self.io.write_all(&encode_head(&head)).await?;
            }

            ResponsePart::BodyChunk(chunk) => {
                match self.framing {
                    WriteFraming::Chunked => {
                        self.io
                            .write_all(format!("{:X}\r\n", chunk.len()).as_bytes())
                            .await?;
                        self.io.write_all(&chunk).await?;
                        self.io.write_all(b"\r\n").await?;
                    }
                    WriteFraming::Raw => self.io.write_all(&chunk).await?,
                    WriteFraming::NoBody => {}
                }
                self.io.flush().await?;
            }

            ResponsePart::End(trailers) => {
                if self.framing == WriteFraming::Chunked {
                    let mut end = b"0\r\n".to_vec();
                    if let Some(trailers) = &trailers {
                        write_headers(&mut end, trailers);
                    }
                    end.extend_from_slice(b"\r\n");
                    self.io.write_all(&end).await?;
                }
                self.io.flush().await?;
            }
        }
        Ok(())
    }
}

fn response_framing(head: &mut ResponseHead) -> WriteFraming {
    let status = head.status;
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return WriteFraming::NoBody;
    }

    // No chunked coding before HTTP/1.1; the body runs until close.
    if head.version == Version::HTTP_10 {
        head.headers.remove(header::TRANSFER_ENCODING);
        return WriteFraming::Raw;
    }

    if head.headers.contains_key(header::TRANSFER_ENCODING) {
        return WriteFraming::Chunked;
    }

    if head.headers.contains_key(header::CONTENT_LENGTH) {
        return WriteFraming::Raw;
    }

    head.headers.insert(
        header::TRANSFER_ENCODING,
        HeaderValue::from_static("chunked"),
    );
    WriteFraming::Chunked
}

fn encode_head(head: &ResponseHead) -> Vec<u8> {
    let mut out = format!(
        "{:?} {} {}\r\n",
        head.version,
        head.status.as_str(),
        head.status.canonical_reason().unwrap_or("Unknown")
    )
    .into_bytes();
    write_headers(&mut out, &head.headers);
    out.extend_from_slice(b"\r\n");
    out
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}
