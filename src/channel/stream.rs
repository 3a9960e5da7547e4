//! Stream-factory abstraction (spec.md §9 design notes): the reliable
//! channel doesn't know or care how a fresh underlying stream is
//! obtained, only that one can be asked for. A factory returns a fresh
//! stream on demand; the channel owns and closes it. This replaces the
//! original's "channel carrying a pointer-to-struct plus a per-stream
//! done sentinel" with a plain trait object.

use std::future::Future;
use std::pin::Pin;

use futures::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A duplex, ordered byte stream: whatever the overlay network hands us
/// for a single `transfer` protocol connection.
pub trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexStream for T {}

pub type BoxedStream = Box<dyn DuplexStream>;

/// Supplies fresh underlying streams to a reliable-channel writer or
/// reader whenever the current one has been dropped.
pub trait StreamSource: Send {
    /// Waits for the next stream, or for `cancel` to fire.
    fn next_stream<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<BoxedStream>> + Send + 'a>>;
}

/// A `StreamSource` backed by a bounded queue of already-accepted
/// streams (the sender's use case: incoming `transfer` streams are
/// pushed by the protocol handler as they arrive).
pub struct QueueStreamSource {
    rx: tokio::sync::mpsc::Receiver<BoxedStream>,
}

impl QueueStreamSource {
    pub fn new(rx: tokio::sync::mpsc::Receiver<BoxedStream>) -> Self {
        QueueStreamSource { rx }
    }
}

impl StreamSource for QueueStreamSource {
    fn next_stream<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<BoxedStream>> + Send + 'a>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(crate::error::Error::simple(crate::error::ErrorKind::Cancellation)),
                stream = self.rx.recv() => {
                    stream.ok_or_else(|| crate::error::Error::simple(crate::error::ErrorKind::Cancellation))
                }
            }
        })
    }
}

/// A `StreamSource` backed by a closure that actively dials a fresh
/// stream (the receiver's use case: `transfer` streams are opened on
/// demand against the authenticated sender).
pub struct DialStreamSource<F> {
    dial: F,
}

impl<F> DialStreamSource<F>
where
    F: for<'a> FnMut(
            &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<BoxedStream>> + Send + 'a>>
        + Send,
{
    pub fn new(dial: F) -> Self {
        DialStreamSource { dial }
    }
}

impl<F> StreamSource for DialStreamSource<F>
where
    F: for<'a> FnMut(
            &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<BoxedStream>> + Send + 'a>>
        + Send,
{
    fn next_stream<'a>(
        &'a mut self,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<BoxedStream>> + Send + 'a>> {
        (self.dial)(cancel)
    }
}
