//! Writer half of the reliable channel (spec.md §4.1).

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::buffer::{WriteBuffer, DEFAULT_WRITE_BUFFER};
use super::protocol::{read_ack_response, write_ack_request, write_data, FIN_ACKED};
use super::stream::{BoxedStream, StreamSource};
use crate::error::{Error, ErrorKind, Result};

const CLOSE_DEADLINE: Duration = Duration::from_secs(3);

pub struct ChannelWriter<S> {
    source: S,
    stream: Option<BoxedStream>,
    buffer: WriteBuffer,
    payload_size: u16,
    cancel: CancellationToken,
}

impl<S: StreamSource> ChannelWriter<S> {
    pub fn new(source: S, payload_size: u16, cancel: CancellationToken) -> Self {
        ChannelWriter {
            source,
            stream: None,
            buffer: WriteBuffer::new(DEFAULT_WRITE_BUFFER),
            payload_size,
            cancel,
        }
    }

    /// Chops `data` into chunks no larger than the configured payload size
    /// and writes each, flushing first whenever the buffer can't hold the
    /// next chunk or a brand new stream was just acquired.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            self.check_cancelled()?;
            let take = data.len().min(self.payload_size as usize);
            let (chunk, rest) = data.split_at(take);
            self.write_chunk(chunk).await?;
            data = rest;
        }
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        loop {
            self.check_cancelled()?;
            let fresh = self.acquire_stream().await?;
            if fresh || !self.buffer.can_hold(chunk.len()) {
                self.flush(false).await?;
            }
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| Error::unexpected("writer has no current stream after acquire"))?;
            match write_data(stream, chunk).await {
                Ok(()) => {
                    self.buffer.push(chunk)?;
                    return Ok(());
                }
                Err(_) => {
                    self.stream = None;
                }
            }
        }
    }

    /// Drains the unacknowledged buffer by repeatedly requesting the
    /// reader's absorbed offset, committing past it, and replaying
    /// whatever remains. `end` has no distinct behavior beyond the
    /// ordinary loop condition: the buffer holds exactly the unconfirmed
    /// bytes in both cases.
    pub async fn flush(&mut self, _end: bool) -> Result<()> {
        while !self.buffer.is_empty() {
            self.check_cancelled()?;
            self.acquire_stream().await?;
            let round = self.flush_round().await;
            match round {
                Ok(()) => {}
                Err(_) => {
                    self.stream = None;
                }
            }
        }
        Ok(())
    }

    async fn flush_round(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| Error::unexpected("flush called with no current stream"))?;
        write_ack_request(stream).await?;
        let offset = read_ack_response(stream).await?;
        self.buffer.commit(offset)?;
        let remaining = self.buffer.data().to_vec();
        for chunk in remaining.chunks(self.payload_size as usize) {
            write_data(stream, chunk).await?;
        }
        Ok(())
    }

    /// Drains the buffer, then loops sending the zero-length FIN packet
    /// followed by an ACK-request, until the reader answers with the
    /// `FIN_ACKED` sentinel, bounded by a 3-second deadline.
    pub async fn close(&mut self) -> Result<()> {
        self.flush(true).await?;
        match tokio::time::timeout(CLOSE_DEADLINE, self.close_loop()).await {
            Ok(inner) => inner,
            Err(_) => Err(Error::wrapped(ErrorKind::Protocol, "close deadline elapsed")),
        }
    }

    async fn close_loop(&mut self) -> Result<()> {
        loop {
            self.check_cancelled()?;
            self.acquire_stream().await?;
            let outcome = {
                let stream = self
                    .stream
                    .as_mut()
                    .ok_or_else(|| Error::unexpected("close called with no current stream"))?;
                write_data(stream, &[]).await?;
                write_ack_request(stream).await?;
                read_ack_response(stream).await
            };
            match outcome {
                Ok(offset) if offset == FIN_ACKED => return Ok(()),
                Ok(_) => {
                    self.stream = None;
                }
                Err(_) => {
                    self.stream = None;
                }
            }
        }
    }

    /// Returns `true` if a brand new stream was just obtained.
    async fn acquire_stream(&mut self) -> Result<bool> {
        if self.stream.is_some() {
            return Ok(false);
        }
        let stream = self.source.next_stream(&self.cancel).await?;
        self.stream = Some(stream);
        Ok(true)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::simple(ErrorKind::Cancellation))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::protocol::{read_inbound, Inbound};
    use futures::io::{AsyncReadExt, AsyncWriteExt};
    use std::future::Future;
    use std::pin::Pin;
    use tokio::io::duplex;
    use tokio_util::compat::TokioAsyncReadCompatExt;

    struct OneShot {
        stream: Option<BoxedStream>,
    }

    impl StreamSource for OneShot {
        fn next_stream<'a>(
            &'a mut self,
            _cancel: &'a CancellationToken,
        ) -> Pin<Box<dyn Future<Output = Result<BoxedStream>> + Send + 'a>> {
            Box::pin(async move {
                self.stream
                    .take()
                    .ok_or_else(|| Error::unexpected("no more streams"))
            })
        }
    }

    #[tokio::test]
    async fn write_then_close_produces_expected_packets() {
        let (client, server) = duplex(1 << 16);
        let client: BoxedStream = Box::new(client.compat());
        let mut server = server.compat();

        let cancel = CancellationToken::new();
        let mut writer = ChannelWriter::new(
            OneShot {
                stream: Some(client),
            },
            8192,
            cancel,
        );

        let handle = tokio::spawn(async move {
            writer.write(b"hello world").await.unwrap();
            writer.close().await.unwrap();
        });

        match read_inbound(&mut server, 8192).await.unwrap() {
            Inbound::Data(p) => assert_eq!(p, b"hello world"),
            _ => panic!("expected data"),
        }
        // flush(end=true) asks for an ack before closing
        match read_inbound(&mut server, 8192).await.unwrap() {
            Inbound::AckRequest => {}
            _ => panic!("expected ack request"),
        }
        crate::channel::protocol::write_ack_response(&mut server, 11)
            .await
            .unwrap();
        // FIN, followed by an ack-request the reader must answer
        match read_inbound(&mut server, 8192).await.unwrap() {
            Inbound::Data(p) => assert!(p.is_empty()),
            _ => panic!("expected fin"),
        }
        match read_inbound(&mut server, 8192).await.unwrap() {
            Inbound::AckRequest => {}
            _ => panic!("expected ack request after fin"),
        }
        crate::channel::protocol::write_ack_response(&mut server, FIN_ACKED)
            .await
            .unwrap();

        handle.await.unwrap();
    }
}
