//! Byte sources: the stream side of a payload.
//!
//! A [`ByteSource`] is a [`Stream`] of chunks that also declares what kind
//! of source it is and knows how to release itself. The stream ends with
//! `None`; an `Err` item is a source failure.
//!
//! Three adapters ship with the crate:
//!
//! | Source | Kind | Backed by |
//! |---|---|---|
//! | [`ChannelSource`] | [`SourceKind::Emitter`] | a tokio mpsc channel |
//! | [`FileSource`] | [`SourceKind::File`] | a lazily opened tokio file |
//! | [`BodySource`] | [`SourceKind::Emitter`] | any `http_body::Body` |

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::content_type::ContentType;

// ── Chunk ─────────────────────────────────────────────────────────────────────

/// One piece of stream data, coerced to bytes on arrival.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk(Bytes);

impl Chunk {
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Chunk {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(b: Vec<u8>) -> Self {
        Self(b.into())
    }
}

impl From<String> for Chunk {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&'static str> for Chunk {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<&'static [u8]> for Chunk {
    fn from(b: &'static [u8]) -> Self {
        Self(Bytes::from_static(b))
    }
}

// ── SourceKind ────────────────────────────────────────────────────────────────

/// The declared nature of a source.
///
/// Only used to label the buffered result; the bytes are never inspected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SourceKind {
    /// Output of a compression transform.
    Compressed,
    /// A file read stream.
    File,
    /// A generic event-emitting stream.
    Emitter,
    #[default]
    Unknown,
}

impl SourceKind {
    pub fn content_type(self) -> ContentType {
        match self {
            Self::Compressed => ContentType::Gzip,
            Self::File       => ContentType::OctetStream,
            Self::Emitter    => ContentType::Stream,
            Self::Unknown    => ContentType::OctetStream,
        }
    }
}

// ── ByteSource ────────────────────────────────────────────────────────────────

/// A stream of byte chunks that can be consumed into a response body.
pub trait ByteSource: Stream<Item = io::Result<Chunk>> + Send + Unpin {
    /// What kind of source this is. Unrecognized sources stay `Unknown`.
    fn kind(&self) -> SourceKind {
        SourceKind::Unknown
    }

    /// Releases the underlying resource. The consumer calls this at most
    /// once; a failure is reported, never propagated.
    fn release(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn kind(&self) -> SourceKind {
        (**self).kind()
    }

    fn release(&mut self) -> io::Result<()> {
        (**self).release()
    }
}

// ── ChannelSource ─────────────────────────────────────────────────────────────

/// Emitter-style source fed through a tokio channel.
///
/// The stream ends once every sender is dropped.
///
/// ```rust
/// use reply::ChannelSource;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (tx, source) = ChannelSource::channel(8);
/// tokio::spawn(async move {
///     let _ = tx.send(Ok("hello ".into())).await;
///     let _ = tx.send(Ok("world".into())).await;
/// });
/// # drop(source);
/// # }
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<io::Result<Chunk>>,
    kind: SourceKind,
}

impl ChannelSource {
    pub fn channel(buffer: usize) -> (mpsc::Sender<io::Result<Chunk>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    pub fn new(rx: mpsc::Receiver<io::Result<Chunk>>) -> Self {
        Self { rx, kind: SourceKind::Emitter }
    }

    /// Overrides the declared kind, e.g. for a channel fed by a compressor.
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }
}

impl Stream for ChannelSource {
    type Item = io::Result<Chunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl ByteSource for ChannelSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn release(&mut self) -> io::Result<()> {
        self.rx.close();
        Ok(())
    }
}

// ── FileSource ────────────────────────────────────────────────────────────────

const FILE_CHUNK: usize = 64 * 1024;

type OpenFuture = Pin<Box<dyn Future<Output = io::Result<File>> + Send>>;

enum FileState {
    Opening(OpenFuture),
    Reading(File),
    Done,
}

/// File read stream.
///
/// The file is opened on first poll, so a missing or unreadable path shows
/// up as a stream error (and is classified as such) rather than failing
/// construction.
pub struct FileSource {
    path: PathBuf,
    state: FileState,
    buf: Box<[u8]>,
}

impl FileSource {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let open = File::open(path.clone());
        Self {
            path,
            state: FileState::Opening(Box::pin(open)),
            buf: vec![0; FILE_CHUNK].into_boxed_slice(),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Stream for FileSource {
    type Item = io::Result<Chunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            match &mut this.state {
                FileState::Opening(open) => match ready!(open.as_mut().poll(cx)) {
                    Ok(file) => this.state = FileState::Reading(file),
                    Err(err) => {
                        this.state = FileState::Done;
                        return Poll::Ready(Some(Err(err)));
                    }
                },
                FileState::Reading(file) => {
                    let mut read_buf = ReadBuf::new(&mut this.buf);
                    return match ready!(Pin::new(file).poll_read(cx, &mut read_buf)) {
                        Ok(()) if read_buf.filled().is_empty() => {
                            this.state = FileState::Done;
                            Poll::Ready(None)
                        }
                        Ok(()) => {
                            let chunk = Bytes::copy_from_slice(read_buf.filled());
                            Poll::Ready(Some(Ok(chunk.into())))
                        }
                        Err(err) => {
                            this.state = FileState::Done;
                            Poll::Ready(Some(Err(err)))
                        }
                    };
                }
                FileState::Done => return Poll::Ready(None),
            }
        }
    }
}

impl ByteSource for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn release(&mut self) -> io::Result<()> {
        self.state = FileState::Done;
        Ok(())
    }
}

// ── BodySource ────────────────────────────────────────────────────────────────

/// Adapts an HTTP body (e.g. an incoming hyper request body) into a source.
/// Trailer frames are skipped.
#[derive(Debug)]
pub struct BodySource<B> {
    body: Option<B>,
}

impl<B> BodySource<B> {
    pub fn new(body: B) -> Self {
        Self { body: Some(body) }
    }
}

impl<B> Stream for BodySource<B>
where
    B: http_body::Body + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = io::Result<Chunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(body) = self.body.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(Pin::new(body).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    if let Ok(mut data) = frame.into_data() {
                        let bytes = data.copy_to_bytes(data.remaining());
                        return Poll::Ready(Some(Ok(bytes.into())));
                    }
                }
                Some(Err(err)) => return Poll::Ready(Some(Err(io::Error::other(err)))),
                None => {
                    self.body = None;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<B> ByteSource for BodySource<B>
where
    B: http_body::Body + Send + Unpin,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn kind(&self) -> SourceKind {
        SourceKind::Emitter
    }

    fn release(&mut self) -> io::Result<()> {
        self.body = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use http_body_util::{Full, StreamBody};
    use std::io::Write;

    #[test]
    fn kinds_map_to_content_types() {
        assert_eq!(SourceKind::Compressed.content_type(), ContentType::Gzip);
        assert_eq!(SourceKind::File.content_type(), ContentType::OctetStream);
        assert_eq!(SourceKind::Emitter.content_type(), ContentType::Stream);
        assert_eq!(SourceKind::default().content_type(), ContentType::OctetStream);
    }

    #[test]
    fn chunks_coerce_to_bytes() {
        assert_eq!(Chunk::from("ab").into_bytes(), Bytes::from_static(b"ab"));
        assert_eq!(Chunk::from(String::from("ab")).len(), 2);
        assert!(Chunk::from(Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn channel_source_ends_when_senders_drop() {
        let (tx, mut source) = ChannelSource::channel(4);
        tx.send(Ok("a".into())).await.unwrap();
        drop(tx);

        assert_eq!(source.next().await.unwrap().unwrap(), Chunk::from("a"));
        assert!(source.next().await.is_none());
        assert_eq!(source.kind(), SourceKind::Emitter);
    }

    #[tokio::test]
    async fn channel_release_is_repeatable() {
        let (_tx, mut source) = ChannelSource::channel(1);
        source.release().unwrap();
        source.release().unwrap();
    }

    #[tokio::test]
    async fn file_source_reads_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"file contents").unwrap();

        let mut source = FileSource::open(file.path());
        let mut out = Vec::new();
        while let Some(chunk) = source.next().await {
            out.extend_from_slice(&chunk.unwrap().into_bytes());
        }
        assert_eq!(out, b"file contents");
    }

    #[tokio::test]
    async fn missing_file_is_a_stream_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FileSource::open(dir.path().join("nope.bin"));

        let err = source.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn body_source_yields_data_frames() {
        let mut source = BodySource::new(Full::new(Bytes::from_static(b"payload")));
        assert_eq!(source.next().await.unwrap().unwrap(), Chunk::from("payload"));
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn body_source_surfaces_body_errors() {
        let frames = futures::stream::iter(vec![
            Ok(http_body::Frame::data(Bytes::from_static(b"x"))),
            Err(io::Error::other("reset")),
        ]);
        let mut source = BodySource::new(StreamBody::new(frames));

        assert!(source.next().await.unwrap().is_ok());
        let err = source.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "reset");
    }
}
