//! Directory/file tree streaming through the reliable channel
//! (spec.md §4.5): sender-side walk+emit, receiver-side validate+write.

pub mod framing;
pub mod path;

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::channel::{ChannelReader, ChannelWriter, StreamSource};
use crate::error::{Error, ErrorKind, Result, ResultWrappedExt};
use framing::{
    read_header, write_end, write_header, BufferedReader, EntryHeader, EntryKind, NextEntry,
};
use path::{clean_relative, join_within, relative_between, resolve_symlink_target};

const COPY_CHUNK: usize = 64 * 1024;

/// Progress reporting hook for the archive layer; the CLI implements
/// this over `indicatif` progress bars. Core archive logic never
/// depends on a concrete UI.
pub trait Progress: Send {
    fn start_entry(&mut self, name: &str, total: u64);
    fn advance(&mut self, bytes: u64);
    fn finish_entry(&mut self);
}

/// A `Progress` that reports nothing, for tests and headless use.
pub struct NoopProgress;

impl Progress for NoopProgress {
    fn start_entry(&mut self, _name: &str, _total: u64) {}
    fn advance(&mut self, _bytes: u64) {}
    fn finish_entry(&mut self) {}
}

#[cfg(unix)]
fn normalize_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn normalize_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .wrapped(ErrorKind::IoFatal)
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn archive_path_of(root_name: &str, rel: &Path) -> String {
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    if rel_str.is_empty() || rel_str == "." {
        root_name.to_string()
    } else {
        format!("{}/{}", root_name, rel_str)
    }
}

/// Walks `base` and streams every entry into `writer`, then writes the
/// terminator block and closes the channel.
pub async fn emit<S: StreamSource>(
    writer: &mut ChannelWriter<S>,
    base: &Path,
    progress: &mut dyn Progress,
) -> Result<()> {
    let metadata = tokio::fs::symlink_metadata(base)
        .await
        .wrapped(ErrorKind::IoFatal)?;
    let root_name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());

    if metadata.is_file() {
        emit_file(writer, base, &root_name, &metadata, progress).await?;
    } else if metadata.is_dir() {
        emit_dir_header(writer, &root_name, &metadata).await?;
        walk_dir(base, base, &root_name, writer, progress).await?;
    } else {
        return Err(Error::wrapped(
            ErrorKind::Validation,
            "base path must be a regular file or directory",
        ));
    }
    write_end(writer).await
}

async fn walk_dir<S: StreamSource>(
    base: &Path,
    dir: &Path,
    root_name: &str,
    writer: &mut ChannelWriter<S>,
    progress: &mut dyn Progress,
) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await.wrapped(ErrorKind::IoFatal)?;
    while let Some(entry) = entries.next_entry().await.wrapped(ErrorKind::IoFatal)? {
        let entry_path = entry.path();
        let metadata = tokio::fs::symlink_metadata(&entry_path)
            .await
            .wrapped(ErrorKind::IoFatal)?;
        let rel = entry_path.strip_prefix(base).unwrap_or(&entry_path);
        let archive_name = archive_path_of(root_name, rel);

        if metadata.file_type().is_symlink() {
            emit_symlink(base, &entry_path, &archive_name, writer).await?;
        } else if metadata.is_dir() {
            emit_dir_header(writer, &archive_name, &metadata).await?;
            Box::pin(walk_dir(base, &entry_path, root_name, writer, progress)).await?;
        } else if metadata.is_file() {
            emit_file(writer, &entry_path, &archive_name, &metadata, progress).await?;
        }
        // sockets, devices, FIFOs: skipped silently (spec.md §4.5).
    }
    Ok(())
}

async fn emit_dir_header<S: StreamSource>(
    writer: &mut ChannelWriter<S>,
    name: &str,
    metadata: &std::fs::Metadata,
) -> Result<()> {
    let header = EntryHeader {
        kind: EntryKind::Dir,
        path: name.to_string(),
        mode: normalize_mode(metadata),
        size: 0,
        link_target: None,
    };
    write_header(writer, &header).await
}

async fn emit_file<S: StreamSource>(
    writer: &mut ChannelWriter<S>,
    path: &Path,
    name: &str,
    metadata: &std::fs::Metadata,
    progress: &mut dyn Progress,
) -> Result<()> {
    let size = metadata.len();
    let header = EntryHeader {
        kind: EntryKind::File,
        path: name.to_string(),
        mode: normalize_mode(metadata),
        size,
        link_target: None,
    };
    write_header(writer, &header).await?;

    let mut file = tokio::fs::File::open(path).await.wrapped(ErrorKind::IoFatal)?;
    progress.start_entry(name, size);
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut remaining = size;
    while remaining > 0 {
        let take = buf.len().min(remaining as usize);
        let n = file
            .read(&mut buf[..take])
            .await
            .wrapped(ErrorKind::IoFatal)?;
        if n == 0 {
            return Err(Error::wrapped(
                ErrorKind::IoFatal,
                format!("{} shrank while being read", path.display()),
            ));
        }
        writer.write(&buf[..n]).await?;
        progress.advance(n as u64);
        remaining -= n as u64;
    }
    progress.finish_entry();
    Ok(())
}

async fn emit_symlink<S: StreamSource>(
    base: &Path,
    link_path: &Path,
    name: &str,
    writer: &mut ChannelWriter<S>,
) -> Result<()> {
    let raw_target = tokio::fs::read_link(link_path)
        .await
        .wrapped(ErrorKind::IoFatal)?;
    let link_parent = link_path.parent().unwrap_or(link_path);

    let absolute_target = if raw_target.is_absolute() {
        raw_target
    } else {
        let mut combined = link_parent.to_path_buf();
        for component in raw_target.components() {
            match component {
                std::path::Component::ParentDir => {
                    combined.pop();
                }
                std::path::Component::Normal(seg) => combined.push(seg),
                std::path::Component::CurDir => {}
                _ => {}
            }
        }
        combined
    };

    if !absolute_target.starts_with(base) {
        // resolves outside the base tree: omitted, not an error.
        return Ok(());
    }

    let stored_target = relative_between(link_parent, &absolute_target)
        .to_string_lossy()
        .replace('\\', "/");
    let metadata = tokio::fs::symlink_metadata(link_path)
        .await
        .wrapped(ErrorKind::IoFatal)?;
    let header = EntryHeader {
        kind: EntryKind::Symlink,
        path: name.to_string(),
        mode: normalize_mode(&metadata),
        size: 0,
        link_target: Some(stored_target),
    };
    write_header(writer, &header).await
}

/// Reads entries from `reader` and materializes them under `base`,
/// validating every path and symlink target, deferring symlink
/// creation until all file/directory entries have landed.
pub async fn consume<S: StreamSource>(
    reader: ChannelReader<S>,
    base: &Path,
    progress: &mut dyn Progress,
) -> Result<()> {
    tokio::fs::create_dir_all(base)
        .await
        .wrapped(ErrorKind::IoFatal)?;
    let mut rx = BufferedReader::new(reader);
    let mut deferred_symlinks: Vec<(PathBuf, String)> = Vec::new();

    loop {
        match read_header(&mut rx).await? {
            NextEntry::End => break,
            NextEntry::Header(header) => {
                consume_entry(base, header, &mut rx, progress, &mut deferred_symlinks).await?;
            }
        }
    }

    // The terminator block is application-level padding, not the
    // channel's own FIN: the sender's `ChannelWriter::close()` is still
    // waiting to hear back. Drain the FIN, then serve its close
    // handshake (spec.md §4.1 reader "Close").
    let mut reader = rx.into_inner();
    if reader.read().await?.is_some() {
        return Err(Error::wrapped(
            ErrorKind::Protocol,
            "unexpected data after archive terminator",
        ));
    }
    reader.close().await?;

    for (link_path, target) in deferred_symlinks {
        create_symlink_replacing(&link_path, &target).await?;
    }
    Ok(())
}

async fn consume_entry<S: StreamSource>(
    base: &Path,
    header: EntryHeader,
    rx: &mut BufferedReader<S>,
    progress: &mut dyn Progress,
    deferred_symlinks: &mut Vec<(PathBuf, String)>,
) -> Result<()> {
    let cleaned = clean_relative(&header.path)?;
    let target_path = join_within(base, &cleaned)?;

    match header.kind {
        EntryKind::Dir => {
            tokio::fs::create_dir_all(&target_path)
                .await
                .wrapped(ErrorKind::IoFatal)?;
            set_mode(&target_path, header.mode).await?;
        }
        EntryKind::File => {
            if let Some(parent) = target_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .wrapped(ErrorKind::IoFatal)?;
            }
            let mut file = tokio::fs::File::create(&target_path)
                .await
                .wrapped(ErrorKind::IoFatal)?;
            progress.start_entry(&header.path, header.size);
            let mut remaining = header.size;
            while remaining > 0 {
                let chunk = rx.read_some(remaining.min(COPY_CHUNK as u64) as usize).await?;
                if chunk.is_empty() {
                    return Err(Error::wrapped(
                        ErrorKind::Archive,
                        format!("archive stream ended mid-file: {}", header.path),
                    ));
                }
                file.write_all(&chunk).await.wrapped(ErrorKind::IoFatal)?;
                progress.advance(chunk.len() as u64);
                remaining -= chunk.len() as u64;
            }
            progress.finish_entry();
            set_mode(&target_path, header.mode).await?;
        }
        EntryKind::Symlink => {
            let target = header
                .link_target
                .ok_or_else(|| Error::unexpected("symlink entry missing link target"))?;
            resolve_symlink_target(base, &target_path, &target)?;
            deferred_symlinks.push((target_path, target));
        }
    }
    Ok(())
}

async fn create_symlink_replacing(link_path: &Path, target: &str) -> Result<()> {
    match tokio::fs::symlink_metadata(link_path).await {
        Ok(metadata) => {
            if metadata.is_dir() && !metadata.file_type().is_symlink() {
                return Err(Error::wrapped(
                    ErrorKind::Archive,
                    format!(
                        "refusing to overwrite directory with symlink: {}",
                        link_path.display()
                    ),
                ));
            }
            tokio::fs::remove_file(link_path)
                .await
                .wrapped(ErrorKind::IoFatal)?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::from(e)),
    }
    if let Some(parent) = link_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .wrapped(ErrorKind::IoFatal)?;
    }
    create_symlink(target, link_path).await
}

#[cfg(unix)]
async fn create_symlink(target: &str, link_path: &Path) -> Result<()> {
    tokio::fs::symlink(target, link_path)
        .await
        .wrapped(ErrorKind::IoFatal)
}

#[cfg(not(unix))]
async fn create_symlink(_target: &str, _link_path: &Path) -> Result<()> {
    Err(Error::wrapped(
        ErrorKind::Archive,
        "symbolic links are not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::QueueStreamSource;
    use tempfile::tempdir;
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

        let writer = ChannelWriter::new(QueueStreamSource::new(rx_w), 4096, CancellationToken::new());
        let reader = ChannelReader::new(QueueStreamSource::new(rx_r), 4096, CancellationToken::new());
        (writer, reader)
    }

    #[tokio::test]
    async fn round_trips_a_small_tree() {
        let src = tempdir().unwrap();
        tokio::fs::create_dir_all(src.path().join("a")).await.unwrap();
        tokio::fs::write(src.path().join("a/b.txt"), b"hello")
            .await
            .unwrap();

        let dst = tempdir().unwrap();
        let (mut writer, reader) = make_pair();

        let src_path = src.path().to_path_buf();
        let emit_task = tokio::spawn(async move {
            emit(&mut writer, &src_path, &mut NoopProgress).await.unwrap();
        });

        let dst_path = dst.path().to_path_buf();
        consume(reader, &dst_path, &mut NoopProgress).await.unwrap();
        emit_task.await.unwrap();

        let root_name = src.path().file_name().unwrap().to_string_lossy().into_owned();
        let content = tokio::fs::read(dst.path().join(&root_name).join("a/b.txt"))
            .await
            .unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn rejects_absolute_path_entry() {
        let dst = tempdir().unwrap();
        let (mut writer, reader) = make_pair();

        let write_task = tokio::spawn(async move {
            let header = EntryHeader {
                kind: EntryKind::File,
                path: "/etc/passwd".to_string(),
                mode: 0o644,
                size: 0,
                link_target: None,
            };
            write_header(&mut writer, &header).await.unwrap();
            write_end(&mut writer).await.unwrap();
        });

        let err = consume(reader, dst.path(), &mut NoopProgress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Archive);
        assert!(err.to_string().contains("absolute path"));

        write_task.await.unwrap();
        let mut entries = tokio::fs::read_dir(dst.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
