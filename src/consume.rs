//! Bounded stream-to-buffer consumption.
//!
//! A consume operation races four signals: a chunk, a source error, the
//! end of the stream, and its own timer. Exactly one of them settles the
//! operation:
//!
//! ```text
//!             chunk (total ≤ limit)
//!             ┌──────┐
//!             ▼      │
//!  ──────▶ Pending ──┘
//!             │ timeout | error | end | total > limit
//!             ▼
//!          Settled ──▶ every later signal is ignored
//! ```
//!
//! On the settling transition the source is released exactly once. Later
//! releases (including the one on drop) are no-ops, and a failing release
//! goes to the [`DiagnosticSink`] instead of the caller.

use std::io;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::debug;

use crate::content_type::ContentType;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::{Error, Result, StatusClass};
use crate::source::{ByteSource, Chunk, SourceKind};

pub const DEFAULT_STREAM_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_STREAM_BYTES: u64 = 50 * 1024 * 1024;

/// Replaces a source error with a caller-chosen one. Returning `None`
/// keeps the original. Never consulted for timeouts or size limits.
pub type ErrorHandler = Arc<dyn Fn(&io::Error) -> Option<Error> + Send + Sync>;

/// How long and how much a consume operation may take.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    pub timeout: Duration,
    pub max_bytes: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_STREAM_TIMEOUT_MS),
            max_bytes: DEFAULT_MAX_STREAM_BYTES,
        }
    }
}

impl Limits {
    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// A fully buffered stream.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamResult {
    pub body: Bytes,
    /// From the source's declared kind, never from the bytes.
    pub content_type: ContentType,
    /// Always `body.len()`.
    pub size: u64,
}

/// Consumes sources under fixed limits and policy.
#[derive(Clone)]
pub struct StreamConsumer {
    limits: Limits,
    error_handler: Option<ErrorHandler>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for StreamConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConsumer")
            .field("limits", &self.limits)
            .field("error_handler", &self.error_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl StreamConsumer {
    pub fn new(limits: Limits) -> Self {
        Self { limits, error_handler: None, diagnostics: Arc::new(TracingSink) }
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Buffers `source` to completion, or fails on timeout, size limit or
    /// source error, whichever comes first.
    pub async fn consume<S: ByteSource>(&self, source: S) -> Result<StreamResult> {
        let mut run = Run::new(source, self);
        debug!(
            kind = ?run.kind,
            timeout_ms = self.limits.timeout_ms(),
            max_bytes = self.limits.max_bytes,
            "consuming stream"
        );

        let timer = tokio::time::sleep(self.limits.timeout);
        tokio::pin!(timer);

        loop {
            if let Some(outcome) = run.settlement.take() {
                return outcome;
            }
            // Timer first: a source that is always ready must not starve it.
            let signal = tokio::select! {
                biased;
                () = &mut timer => Signal::Timeout,
                item = run.source.next() => match item {
                    Some(Ok(chunk)) => Signal::Chunk(chunk),
                    Some(Err(err)) => Signal::Error(err),
                    None => Signal::End,
                },
            };
            run.dispatch(signal);
        }
    }
}

/// Consumes `source` with default policy.
pub async fn consume<S: ByteSource>(source: S, limits: Limits) -> Result<StreamResult> {
    StreamConsumer::new(limits).consume(source).await
}

// ── Settlement ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Pending,
    Settled,
}

/// One-shot outcome slot. Only the first `settle` takes effect.
pub(crate) struct Settlement<T> {
    state: State,
    outcome: Option<Result<T>>,
}

impl<T> Settlement<T> {
    pub(crate) fn new() -> Self {
        Self { state: State::Pending, outcome: None }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.state == State::Settled
    }

    /// Returns whether this call was the settling one.
    pub(crate) fn settle(&mut self, outcome: Result<T>) -> bool {
        if self.is_settled() {
            return false;
        }
        self.state = State::Settled;
        self.outcome = Some(outcome);
        true
    }

    /// Takes the outcome once settled. The state stays `Settled`.
    pub(crate) fn take(&mut self) -> Option<Result<T>> {
        self.outcome.take()
    }
}

// ── Run ───────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Signal {
    Chunk(Chunk),
    Error(io::Error),
    End,
    Timeout,
}

impl Signal {
    fn name(&self) -> &'static str {
        match self {
            Self::Chunk(_) => "chunk",
            Self::Error(_) => "error",
            Self::End => "end",
            Self::Timeout => "timeout",
        }
    }
}

/// State of one consume operation. Owns the source until dropped.
struct Run<'a, S: ByteSource> {
    source: S,
    kind: SourceKind,
    policy: &'a StreamConsumer,
    buf: BytesMut,
    received: u64,
    released: bool,
    settlement: Settlement<StreamResult>,
}

impl<'a, S: ByteSource> Run<'a, S> {
    fn new(source: S, policy: &'a StreamConsumer) -> Self {
        let kind = source.kind();
        Self {
            source,
            kind,
            policy,
            buf: BytesMut::new(),
            received: 0,
            released: false,
            settlement: Settlement::new(),
        }
    }

    fn dispatch(&mut self, signal: Signal) {
        if self.settlement.is_settled() {
            self.policy.diagnostics.late_signal(self.kind, signal.name());
            return;
        }
        match signal {
            Signal::Chunk(chunk) => self.on_chunk(chunk),
            Signal::Error(err) => self.on_error(err),
            Signal::End => self.on_end(),
            Signal::Timeout => self.on_timeout(),
        }
    }

    fn on_chunk(&mut self, chunk: Chunk) {
        let bytes = chunk.into_bytes();
        self.received = self.received.saturating_add(bytes.len() as u64);

        let limit = self.policy.limits.max_bytes;
        if self.received > limit {
            self.release();
            debug!(limit, actual = self.received, "stream exceeded size limit");
            self.settlement.settle(Err(Error::StreamSizeLimit { limit, actual: self.received }));
            return;
        }
        self.buf.extend_from_slice(&bytes);
    }

    fn on_error(&mut self, err: io::Error) {
        self.release();
        debug!(kind = ?self.kind, error = %err, "stream source failed");
        let replacement = self.policy.error_handler.as_ref().and_then(|remap| remap(&err));
        let failure = match replacement {
            Some(replacement) => replacement,
            None => Error::Source { class: StatusClass::of(&err), source: err },
        };
        self.settlement.settle(Err(failure));
    }

    fn on_end(&mut self) {
        self.release();
        let body = mem::take(&mut self.buf).freeze();
        let size = body.len() as u64;
        debug!(kind = ?self.kind, size, "stream consumed");
        self.settlement.settle(Ok(StreamResult { body, content_type: self.kind.content_type(), size }));
    }

    fn on_timeout(&mut self) {
        self.release();
        let timeout_ms = self.policy.limits.timeout_ms();
        debug!(timeout_ms, received = self.received, "stream timed out");
        self.settlement.settle(Err(Error::StreamTimeout { timeout_ms }));
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.source.release() {
            self.policy.diagnostics.release_failed(self.kind, &err);
        }
    }
}

impl<S: ByteSource> Drop for Run<'_, S> {
    fn drop(&mut self) {
        self.release();
    }
}
