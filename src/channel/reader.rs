//! Reader half of the reliable channel (spec.md §4.1).

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::protocol::{read_inbound, write_ack_response, Inbound, FIN_ACKED};
use super::stream::{BoxedStream, StreamSource};
use crate::error::{Error, ErrorKind, Result};

const CLOSE_DEADLINE: Duration = Duration::from_secs(3);

pub struct ChannelReader<S> {
    source: S,
    stream: Option<BoxedStream>,
    offset: u64,
    max_len: u16,
    cancel: CancellationToken,
    read_closed: bool,
}

impl<S: StreamSource> ChannelReader<S> {
    pub fn new(source: S, max_len: u16, cancel: CancellationToken) -> Self {
        ChannelReader {
            source,
            stream: None,
            offset: 0,
            max_len,
            cancel,
            read_closed: false,
        }
    }

    /// Total bytes delivered so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next chunk of data, serving any ACK-requests along the
    /// way. Returns `Ok(None)` on FIN.
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        if self.read_closed {
            return Ok(None);
        }
        loop {
            self.check_cancelled()?;
            self.acquire_stream().await?;
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| Error::unexpected("reader has no current stream after acquire"))?;
            match read_inbound(stream, self.max_len).await {
                Ok(Inbound::Data(payload)) if payload.is_empty() => {
                    self.read_closed = true;
                    self.offset = FIN_ACKED;
                    return Ok(None);
                }
                Ok(Inbound::Data(payload)) => {
                    self.offset += payload.len() as u64;
                    return Ok(Some(payload));
                }
                Ok(Inbound::AckRequest) => {
                    if write_ack_response(stream, self.offset).await.is_err() {
                        self.stream = None;
                    }
                }
                Err(_) => {
                    self.stream = None;
                }
            }
        }
    }

    /// Keeps answering ACK-requests with the FIN-acked sentinel until the
    /// peer stops asking (its stream closes) or a 3-second deadline
    /// elapses. Any actual data arriving during close is a fatal protocol
    /// error.
    pub async fn close(&mut self) -> Result<()> {
        match tokio::time::timeout(CLOSE_DEADLINE, self.close_loop()).await {
            Ok(inner) => inner,
            Err(_) => Ok(()),
        }
    }

    async fn close_loop(&mut self) -> Result<()> {
        loop {
            self.acquire_stream().await?;
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| Error::unexpected("close called with no current stream"))?;
            match read_inbound(stream, self.max_len).await {
                Ok(Inbound::AckRequest) => {
                    if write_ack_response(stream, FIN_ACKED).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(Inbound::Data(_)) => {
                    return Err(Error::simple(ErrorKind::Protocol));
                }
                Err(_) => return Ok(()),
            }
        }
    }

    async fn acquire_stream(&mut self) -> Result<()> {
        if self.stream.is_none() {
            let stream = self.source.next_stream(&self.cancel).await?;
            self.stream = Some(stream);
        }
        Ok(())
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
    use crate::channel::protocol::{read_ack_response, write_data};
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
    async fn reads_data_then_fin() {
        let (client, server) = duplex(1 << 16);
        let client: BoxedStream = Box::new(client.compat());
        let mut server = server.compat();

        let cancel = CancellationToken::new();
        let mut reader = ChannelReader::new(
            OneShot {
                stream: Some(client),
            },
            8192,
            cancel,
        );

        let handle = tokio::spawn(async move {
            let chunk = reader.read().await.unwrap().unwrap();
            assert_eq!(chunk, b"payload");
            assert_eq!(reader.offset(), 7);
            assert!(reader.read().await.unwrap().is_none());
            reader.close().await.unwrap();
        });

        write_data(&mut server, b"payload").await.unwrap();
        write_data(&mut server, b"").await.unwrap();
        // reader close loop: answer once, then drop so it sees EOF
        crate::channel::protocol::write_ack_request(&mut server)
            .await
            .unwrap();
        let offset = read_ack_response(&mut server).await.unwrap();
        assert_eq!(offset, FIN_ACKED);
        drop(server);

        handle.await.unwrap();
    }
}
