//! Request and response body types.
//!
//! [`ResponseBody`] is either a buffered payload (XML documents, error bodies),
//! an open object file streamed in fixed-size chunks, or nothing.
//!
//! [`RequestBody`] is the inbound body handed to handlers unbuffered, so
//! uploads stream to disk as they arrive.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

/// Chunk size used when streaming an object file.
const FILE_CHUNK_SIZE: usize = 64 * 1024;

/// Type-erased request body. Transport failures surface as `io::Error` so
/// the body can feed an `AsyncRead` adapter directly.
pub type RequestBody = UnsyncBoxBody<Bytes, io::Error>;

/// Box any request body into a [`RequestBody`].
pub fn request_body<B>(body: B) -> RequestBody
where
    B: http_body::Body + Send + 'static,
    B::Error: fmt::Display,
{
    body.map_frame(|frame| frame.map_data(|mut data| data.copy_to_bytes(data.remaining())))
        .map_err(|e| io::Error::other(e.to_string()))
        .boxed_unsync()
}

/// A [`RequestBody`] with no data.
#[must_use]
pub fn empty_request_body() -> RequestBody {
    request_body(Empty::<Bytes>::new())
}

/// HTTP response body used by the fakes3 service.
#[derive(Debug, Default)]
pub enum ResponseBody {
    /// Buffered body for XML payloads and error documents.
    Buffered(Full<Bytes>),
    /// An object file streamed from disk.
    File(FileBody),
    /// Empty body for 204 responses and preflight replies.
    #[default]
    Empty,
}

/// Streaming state for an object file.
#[derive(Debug)]
pub struct FileBody {
    file: File,
    remaining: u64,
    buf: BytesMut,
}

impl ResponseBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Stream `len` bytes from an open file.
    ///
    /// The stream ends early if the file turns out to be shorter than `len`.
    #[must_use]
    pub fn from_file(file: File, len: u64) -> Self {
        Self::File(FileBody {
            file,
            remaining: len,
            buf: BytesMut::new(),
        })
    }
}

impl FileBody {
    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<std::io::Result<Bytes>>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }

        let want = usize::try_from(self.remaining)
            .unwrap_or(usize::MAX)
            .min(FILE_CHUNK_SIZE);
        self.buf.resize(want, 0);

        let mut read_buf = ReadBuf::new(&mut self.buf[..]);
        match Pin::new(&mut self.file).poll_read(cx, &mut read_buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Ready(Ok(())) => {
                let n = read_buf.filled().len();
                if n == 0 {
                    // Truncated underneath us.
                    self.remaining = 0;
                    return Poll::Ready(None);
                }
                self.remaining -= n as u64;
                self.buf.truncate(n);
                Poll::Ready(Some(Ok(self.buf.split().freeze())))
            }
        }
    }
}

impl http_body::Body for ResponseBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::File(file) => file
                .poll_chunk(cx)
                .map(|chunk| chunk.map(|res| res.map(Frame::data))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::File(file) => file.remaining == 0,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::File(file) => SizeHint::with_exact(file.remaining),
            Self::Empty => SizeHint::with_exact(0),
        }
    }
}
