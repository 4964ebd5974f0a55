//! Push-based adapter for pipeline integration.
//!
//! A [`ScanStream`] takes paths in through [`ScanStream::push`] and yields one
//! [`ScannedFile`] per pushed path, in push order, once that path has been
//! scanned and its affected roots resolved.

use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::{Error, Result};
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::types::ScannedFile;

type Pushed = (PathBuf, Option<Metadata>);

/// Sequence of scanned files fed by [`push`](Self::push).
///
/// The stream ends after [`close`](Self::close) once everything queued has
/// been emitted.
pub struct ScanStream {
    input: Option<UnboundedSender<Pushed>>,
    output: BoxStream<'static, ScannedFile>,
}

impl ScanStream {
    pub(crate) fn new(scanner: Scanner, resolver: Resolver) -> Self {
        let (input, rx) = unbounded::<Pushed>();

        let output = rx
            .then(move |(path, stats)| {
                let scanner = scanner.clone();
                let resolver = resolver.clone();
                async move {
                    let path = scanner.absolute(&path);
                    scanner.scan(Some(&path), stats).await;
                    let entry = resolver.storage().get(&path).await;
                    let roots = resolver.roots_affected_by(&path).await;
                    ScannedFile { path, entry, roots }
                }
            })
            .boxed();

        Self {
            input: Some(input),
            output,
        }
    }

    /// Queue `path` for scanning.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` after [`close`](Self::close).
    pub fn push(&self, path: impl AsRef<Path>, stats: Option<Metadata>) -> Result<()> {
        let Some(input) = &self.input else {
            return Err(Error::InvalidArgument("stream is closed".to_string()));
        };
        input
            .unbounded_send((path.as_ref().to_path_buf(), stats))
            .map_err(|_| Error::InvalidArgument("stream is closed".to_string()))
    }

    /// Stop accepting paths. Queued paths are still emitted.
    pub fn close(&mut self) {
        self.input = None;
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.input.is_none()
    }
}

impl Stream for ScanStream {
    type Item = ScannedFile;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.output.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ScanStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanStream")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
