use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::{watch, Notify};
use warp::multipart::{FormData, Part};

use crate::errors::BackendError;

/// The size of the chunks handed to the transport.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// The name of the form field carrying the audio.
pub const FILE_FIELD: &str = "file";

/// A file received through the upload form.
#[derive(Debug)]
pub struct UploadedFile {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Pulls the `file` part out of a form submission.
pub async fn parse_upload(content: FormData) -> Result<UploadedFile, BackendError> {
    let parts: Vec<Part> = content
        .try_collect()
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)?;

    let part = parts
        .into_iter()
        .find(|part| part.name() == FILE_FIELD)
        .ok_or(BackendError::PartsMissing)?;

    let name = part.filename().unwrap_or_default().to_owned();
    let content_type = part.content_type().map(str::to_owned);

    let data = part_as_vec(part)
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)?;

    Ok(UploadedFile {
        name,
        content_type,
        data,
    })
}

/// Collects chunks of [`Part`].
pub async fn part_as_vec(raw: Part) -> Result<Vec<u8>, ()> {
    let vec_of_results = part_as_stream(raw).collect::<Vec<_>>().await;

    let vec_of_vecs = vec_of_results
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ())?;

    Ok(vec_of_vecs.concat())
}

/// Collects raw data from [`Part`].
pub fn part_as_stream(raw: Part) -> impl futures::Stream<Item = Result<Vec<u8>, io::Error>> {
    raw.stream().map(|r| {
        r.map(|mut x| x.copy_to_bytes(x.remaining()).to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "could not retrieve chunk"))
    })
}

/// Splits `raw` into chunks, reporting each one to `progress` as the
/// transport pulls it.
pub fn chunked(
    raw: Vec<u8>,
    progress: Progress,
) -> impl futures::Stream<Item = Result<Bytes, io::Error>> + Send + Sync + 'static {
    let total = raw.len() as u64;
    let raw = Bytes::from(raw);

    let chunks = (0..raw.len())
        .step_by(CHUNK_SIZE)
        .map(|start| raw.slice(start..usize::min(start + CHUNK_SIZE, raw.len())))
        .collect::<Vec<_>>();

    let mut sent = 0;

    stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report(sent, total);

        Ok(chunk)
    })
}

/// Reports how far a transfer has got, as a percentage, and carries its
/// cancellation flag. Clones share the same state.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<ProgressInner>,
}

struct ProgressInner {
    sender: Option<watch::Sender<u8>>,
    percent: AtomicU8,
    cancelled: AtomicBool,
    cancellation: Notify,
}

impl Progress {
    /// A reporter nobody listens to.
    pub fn none() -> Self {
        Self::with_sender(None)
    }

    /// A reporter and the receiving end of its percentages.
    pub fn channel() -> (Self, watch::Receiver<u8>) {
        let (sender, receiver) = watch::channel(0);

        (Self::with_sender(Some(sender)), receiver)
    }

    fn with_sender(sender: Option<watch::Sender<u8>>) -> Self {
        Progress {
            inner: Arc::new(ProgressInner {
                sender,
                percent: AtomicU8::new(0),
                cancelled: AtomicBool::new(false),
                cancellation: Notify::new(),
            }),
        }
    }

    /// Records that `sent` of `total` bytes have gone out. Percentages only
    /// ever increase, and nothing is published after cancellation.
    pub fn report(&self, sent: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (u64::min(sent, total) * 100 / total) as u8
        };

        self.publish(percent);
    }

    /// Marks the transfer as complete.
    pub fn finish(&self) {
        self.publish(100);
    }

    pub fn percent(&self) -> u8 {
        self.inner.percent.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.cancellation.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        // registered before the flag is checked so a concurrent cancel
        // can't slip in between
        let notified = self.inner.cancellation.notified();

        if self.is_cancelled() {
            return;
        }

        notified.await;
    }

    fn publish(&self, percent: u8) {
        if self.is_cancelled() {
            return;
        }

        let previous = self.inner.percent.fetch_max(percent, Ordering::SeqCst);

        if percent > previous {
            if let Some(sender) = &self.inner.sender {
                // nobody listening is fine
                let _ = sender.send(percent);
            }
        }
    }
}
