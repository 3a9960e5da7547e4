//! Binary framing for archive entries, streamed through the reliable
//! channel (spec.md §4.5). Tar-like in spirit (a header per entry, file
//! content following immediately, a zero-block terminator) but its own
//! compact format: the reliable channel already gives us an ordered,
//! lossless byte stream, so there's no need for on-disk-tar's wider
//! compatibility surface.

use crate::channel::{ChannelReader, ChannelWriter, StreamSource};
use crate::error::{Error, ErrorKind, Result};

/// Size of the zero-filled terminator block written after the last
/// entry (spec.md §8: "trailing archive padding ... up to 512 bytes").
pub const PADDING_BLOCK: usize = 512;

const KIND_END: u8 = 0;
const KIND_FILE: u8 = 1;
const KIND_DIR: u8 = 2;
const KIND_SYMLINK: u8 = 3;

pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

pub struct EntryHeader {
    pub kind: EntryKind,
    pub path: String,
    pub mode: u32,
    /// File content length for `File`; unused otherwise.
    pub size: u64,
    /// Symlink target for `Symlink`; unused otherwise.
    pub link_target: Option<String>,
}

fn kind_byte(kind: &EntryKind) -> u8 {
    match kind {
        EntryKind::File => KIND_FILE,
        EntryKind::Dir => KIND_DIR,
        EntryKind::Symlink => KIND_SYMLINK,
    }
}

fn encode_str(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Writes one entry header. Caller writes the entry's content (if any)
/// with plain [`ChannelWriter::write`] calls immediately after.
pub async fn write_header<S: StreamSource>(
    writer: &mut ChannelWriter<S>,
    header: &EntryHeader,
) -> Result<()> {
    let mut buf = Vec::new();
    buf.push(kind_byte(&header.kind));
    encode_str(&mut buf, &header.path);
    buf.extend_from_slice(&header.mode.to_be_bytes());
    buf.extend_from_slice(&header.size.to_be_bytes());
    match (&header.kind, &header.link_target) {
        (EntryKind::Symlink, Some(target)) => encode_str(&mut buf, target),
        (EntryKind::Symlink, None) => {
            return Err(Error::unexpected("symlink header missing link target"))
        }
        _ => {}
    }
    writer.write(&buf).await
}

/// Writes the terminator block and closes the channel.
pub async fn write_end<S: StreamSource>(writer: &mut ChannelWriter<S>) -> Result<()> {
    writer.write(&[KIND_END]).await?;
    writer.write(&[0u8; PADDING_BLOCK - 1]).await?;
    writer.close().await
}

pub enum NextEntry {
    Header(EntryHeader),
    End,
}

/// Reads the next header, or the terminator. `rx` must be a
/// [`BufferedReader`] so the byte-aligned header fields survive
/// arbitrary underlying Data-packet chunking.
pub async fn read_header<S: StreamSource>(rx: &mut BufferedReader<S>) -> Result<NextEntry> {
    let kind = rx.read_exact(1).await?[0];
    if kind == KIND_END {
        // drain the rest of the padding block, then the channel's FIN.
        let _ = rx.read_exact(PADDING_BLOCK - 1).await?;
        return Ok(NextEntry::End);
    }
    let path_len = u16::from_be_bytes(rx.read_exact(2).await?.try_into().unwrap());
    let path_bytes = rx.read_exact(path_len as usize).await?;
    let path = String::from_utf8(path_bytes)
        .map_err(|e| Error::wrapped(ErrorKind::Archive, e))?;
    let mode = u32::from_be_bytes(rx.read_exact(4).await?.try_into().unwrap());
    let size = u64::from_be_bytes(rx.read_exact(8).await?.try_into().unwrap());
    let kind_enum = match kind {
        KIND_FILE => EntryKind::File,
        KIND_DIR => EntryKind::Dir,
        KIND_SYMLINK => EntryKind::Symlink,
        other => {
            return Err(Error::wrapped(
                ErrorKind::Archive,
                format!("unsupported archive entry type: {}", other),
            ))
        }
    };
    let link_target = if matches!(kind_enum, EntryKind::Symlink) {
        let len = u16::from_be_bytes(rx.read_exact(2).await?.try_into().unwrap());
        let bytes = rx.read_exact(len as usize).await?;
        Some(String::from_utf8(bytes).map_err(|e| Error::wrapped(ErrorKind::Archive, e))?)
    } else {
        None
    };
    Ok(NextEntry::Header(EntryHeader {
        kind: kind_enum,
        path,
        mode,
        size,
        link_target,
    }))
}

/// Buffers [`ChannelReader`] output so archive framing can request exact
/// byte counts regardless of how the writer chunked its Data packets.
pub struct BufferedReader<S> {
    inner: ChannelReader<S>,
    pending: Vec<u8>,
}

impl<S: StreamSource> BufferedReader<S> {
    pub fn new(inner: ChannelReader<S>) -> Self {
        BufferedReader {
            inner,
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> ChannelReader<S> {
        self.inner
    }

    async fn fill_to(&mut self, n: usize) -> Result<()> {
        while self.pending.len() < n {
            match self.inner.read().await? {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => {
                    return Err(Error::wrapped(
                        ErrorKind::Archive,
                        "archive stream ended mid-entry",
                    ))
                }
            }
        }
        Ok(())
    }

    /// Reads and consumes exactly `n` bytes, buffering extra bytes the
    /// underlying channel handed over for later calls.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill_to(n).await?;
        Ok(self.pending.drain(0..n).collect())
    }

    /// Reads up to `n` bytes, never blocking past what a single
    /// already-buffered or freshly-received chunk provides. Returns an
    /// empty vector only at true archive-stream EOF.
    pub async fn read_some(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.pending.is_empty() {
            match self.inner.read().await? {
                Some(chunk) => self.pending = chunk,
                None => return Ok(Vec::new()),
            }
        }
        let take = n.min(self.pending.len());
        Ok(self.pending.drain(0..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueueStreamSource;
    use tokio::sync::mpsc;
    use tokio_util::compat::TokioAsyncReadCompatExt;
    use tokio_util::sync::CancellationToken;

    fn make_pair() -> (
        ChannelWriter<impl StreamSource>,
        ChannelReader<impl StreamSource>,
    ) {
        let (client, server) = tokio::io::duplex(1 << 20);
        let client: crate::channel::BoxedStream = Box::new(client.compat());
        let server: crate::channel::BoxedStream = Box::new(server.compat());

        let (tx_w, rx_w) = mpsc::channel(1);
        tx_w.try_send(client).unwrap();
        let (tx_r, rx_r) = mpsc::channel(1);
        tx_r.try_send(server).unwrap();

        let writer = ChannelWriter::new(QueueStreamSource::new(rx_w), 256, CancellationToken::new());
        let reader = ChannelReader::new(QueueStreamSource::new(rx_r), 256, CancellationToken::new());
        (writer, reader)
    }

    #[tokio::test]
    async fn header_and_content_round_trip() {
        let (mut writer, reader) = make_pair();
        let header = EntryHeader {
            kind: EntryKind::File,
            path: "a/b.txt".to_string(),
            mode: 0o644,
            size: 5,
            link_target: None,
        };

        let write_task = tokio::spawn(async move {
            write_header(&mut writer, &header).await.unwrap();
            writer.write(b"hello").await.unwrap();
            write_end(&mut writer).await.unwrap();
        });

        let mut rx = BufferedReader::new(reader);
        match read_header(&mut rx).await.unwrap() {
            NextEntry::Header(h) => {
                assert_eq!(h.path, "a/b.txt");
                assert_eq!(h.mode, 0o644);
                assert_eq!(h.size, 5);
            }
            NextEntry::End => panic!("expected header"),
        }
        let content = rx.read_exact(5).await.unwrap();
        assert_eq!(content, b"hello");
        match read_header(&mut rx).await.unwrap() {
            NextEntry::End => {}
            NextEntry::Header(_) => panic!("expected end"),
        }

        // Drain the channel's FIN and serve the writer's close handshake,
        // same as `archive::consume` does after its own read loop.
        let mut reader = rx.into_inner();
        assert!(reader.read().await.unwrap().is_none());
        reader.close().await.unwrap();

        write_task.await.unwrap();
    }
}
