use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, o, warn, Logger};
use time::OffsetDateTime;
use tokio::sync::watch;
use url::Url;

use crate::audio::{Prober, Reducer};
use crate::config::Limits;
use crate::errors::{BackendError, ValidationError};
use crate::io::Progress;
use crate::mime_type::{check_audio_type, guess_from_path};
use crate::normalization::sanitize_file_name;
use crate::store::Store;

/// The folder every upload lands in.
pub const BLOB_PREFIX: &str = "jazz-recordings";

/// A file picked for upload.
#[derive(Clone, Debug)]
pub struct SelectedFile {
    name: String,
    content_type: String,
    data: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        SelectedFile {
            name: name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Reads a local file, guessing its type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();

        let data = tokio::fs::read(path)
            .await
            .map_err(BackendError::TemporaryFileError)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(ValidationError::MissingFileName)?;

        Ok(Self::new(name, guess_from_path(path), data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// One add/edit form's worth of upload state. Lives only as long as the
/// form does.
pub struct UploadSession {
    file: SelectedFile,
    progress: Progress,
    receiver: watch::Receiver<u8>,
    uploading: AtomicBool,
}

impl UploadSession {
    pub fn new(file: SelectedFile) -> Self {
        let (progress, receiver) = Progress::channel();

        UploadSession {
            file,
            progress,
            receiver,
            uploading: AtomicBool::new(false),
        }
    }

    pub fn file(&self) -> &SelectedFile {
        &self.file
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn content_type(&self) -> &str {
        self.file.content_type()
    }

    /// Watches the percentage transferred, from 0 to 100.
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.receiver.clone()
    }

    pub fn percent(&self) -> u8 {
        *self.receiver.borrow()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::SeqCst)
    }

    /// Returns a handle that abandons the transfer, e.g. when the user
    /// navigates away from the form.
    pub fn canceller(&self) -> Canceller {
        Canceller(self.progress.clone())
    }
}

/// Cancels the transfer of an [`UploadSession`].
#[derive(Clone)]
pub struct Canceller(Progress);

impl Canceller {
    pub fn cancel(&self) {
        self.0.cancel()
    }
}

/// The result of a successful upload.
#[derive(Clone, Debug)]
pub struct Uploaded {
    pub url: Url,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub duration: Option<Duration>,
}

/// Validates selected files and moves them into the blob store.
pub struct Uploader {
    logger: Arc<Logger>,
    store: Arc<dyn Store>,
    limits: Limits,
    reducer: Option<Arc<dyn Reducer>>,
    prober: Option<Arc<dyn Prober>>,
}

impl Uploader {
    pub fn new(logger: Arc<Logger>, store: Arc<dyn Store>, limits: Limits) -> Self {
        Uploader {
            logger,
            store,
            limits,
            reducer: None,
            prober: None,
        }
    }

    /// Shrinks files above the reduction threshold before they're sent.
    pub fn with_reducer(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    /// Measures files so recordings can show their real duration.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Checks the type and size of a file without reducing it.
    pub fn validate(&self, file: &SelectedFile) -> Result<(), ValidationError> {
        check_audio_type(file.content_type())?;

        if file.size() > self.limits.max_upload_size && self.reducer.is_none() {
            return Err(ValidationError::TooLarge {
                size: file.size(),
                limit: self.limits.max_upload_size,
            });
        }

        Ok(())
    }

    /// Uploads the session's file. Nothing is transferred unless the file
    /// passes validation.
    pub async fn upload(&self, session: &UploadSession) -> Result<Uploaded, BackendError> {
        let logger = self.logger.new(o!("file" => session.file.name.clone()));

        if session.progress.is_cancelled() {
            return Err(BackendError::UploadCancelled);
        }

        self.validate(&session.file)?;

        let file = self.reduce_if_needed(&logger, session.file.clone()).await?;

        let size = file.size();
        if size > self.limits.max_upload_size {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.limits.max_upload_size,
            }
            .into());
        }

        let name = blob_name(BLOB_PREFIX, now_millis(), file.name())?;
        let duration = self.probe(&logger, &file).await;

        debug!(logger, "Transferring file..."; "name" => &name, "size" => size);
        session.uploading.store(true, Ordering::SeqCst);

        let SelectedFile {
            content_type, data, ..
        } = file;

        let transfer = self
            .store
            .save(&name, &content_type, data, session.progress.clone());

        let result = tokio::select! {
            result = transfer => result,
            _ = session.progress.cancelled() => Err(BackendError::UploadCancelled),
        };

        session.uploading.store(false, Ordering::SeqCst);

        let url = match result {
            Ok(url) if session.progress.is_cancelled() => {
                // the transfer won the race; drop what it stored
                if let Err(e) = self.store.delete(&url).await {
                    warn!(logger, "Failed to remove cancelled upload"; "url" => %url, "error" => %e);
                }

                return Err(BackendError::UploadCancelled);
            }
            Ok(url) => url,
            Err(e) => {
                warn!(logger, "Upload failed"; "error" => %e);
                return Err(e);
            }
        };

        info!(logger, "Upload completed"; "url" => %url);

        Ok(Uploaded {
            url,
            name,
            size,
            content_type,
            duration,
        })
    }

    async fn reduce_if_needed(
        &self,
        logger: &Logger,
        file: SelectedFile,
    ) -> Result<SelectedFile, BackendError> {
        let reducer = match &self.reducer {
            Some(reducer) if file.size() > self.limits.reduce_above => reducer,
            _ => return Ok(file),
        };

        debug!(logger, "Reducing file..."; "size" => file.size());
        let reduced = reducer.reduce(file).await?;
        check_audio_type(reduced.content_type())?;
        debug!(logger, "Reduced file"; "size" => reduced.size());

        Ok(reduced)
    }

    async fn probe(&self, logger: &Logger, file: &SelectedFile) -> Option<Duration> {
        let prober = self.prober.as_ref()?;

        match prober.duration(file.data()).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!(logger, "Could not measure duration"; "error" => %e);
                None
            }
        }
    }
}

/// Builds a collision-resistant blob name from a timestamp and the
/// sanitized file name.
///
/// ```
/// use radio::client::upload::blob_name;
/// assert_eq!(
///     blob_name("jazz-recordings", 1603065600000, "Take Five.mp3").unwrap(),
///     "jazz-recordings/1603065600000-Take-Five.mp3"
/// );
/// ```
pub fn blob_name(prefix: &str, millis: i128, file_name: &str) -> Result<String, ValidationError> {
    let sanitized = sanitize_file_name(file_name);

    if sanitized.is_empty() {
        return Err(ValidationError::MissingFileName);
    }

    Ok(format!("{}/{}-{}", prefix, millis, sanitized))
}

fn now_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

#[cfg(test)]
mod tests {
    use futures::future::{pending, ready, BoxFuture, FutureExt};

    use super::*;
    use crate::errors::ErrorKind;
    use crate::store::memory::MemoryStore;

    fn logger() -> Arc<Logger> {
        Arc::new(log::discard())
    }

    fn memory_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(
            Url::parse("https://blobs.example.com/").unwrap(),
        ))
    }

    fn mp3(size: usize) -> SelectedFile {
        SelectedFile::new("Take Five.mp3", "audio/mpeg", vec![0xff; size])
    }

    struct FailingStore;

    impl Store for FailingStore {
        fn delete(&self, url: &Url) -> BoxFuture<Result<(), BackendError>> {
            ready(Err(BackendError::ForeignUrl(url.clone()))).boxed()
        }

        fn save(
            &self,
            _key: &str,
            _content_type: &str,
            _raw: Vec<u8>,
            _progress: Progress,
        ) -> BoxFuture<Result<Url, BackendError>> {
            ready(Err(BackendError::upload_failed("connection reset"))).boxed()
        }
    }

    /// Reports a little progress, then never finishes.
    struct StallingStore;

    impl Store for StallingStore {
        fn delete(&self, _url: &Url) -> BoxFuture<Result<(), BackendError>> {
            ready(Ok(())).boxed()
        }

        fn save(
            &self,
            _key: &str,
            _content_type: &str,
            _raw: Vec<u8>,
            progress: Progress,
        ) -> BoxFuture<Result<Url, BackendError>> {
            async move {
                progress.report(1, 10);
                pending::<Result<Url, BackendError>>().await
            }
            .boxed()
        }
    }

    /// Stands in for a transcoder by emitting a fixed-size MP3.
    struct HalvingReducer;

    impl Reducer for HalvingReducer {
        fn reduce(&self, file: SelectedFile) -> BoxFuture<Result<SelectedFile, BackendError>> {
            let size = file.data().len() / 2;
            ready(Ok(SelectedFile::new("reduced.mp3", "audio/mpeg", vec![0; size]))).boxed()
        }
    }

    struct FixedProber(Duration);

    impl Prober for FixedProber {
        fn duration(&self, _data: &[u8]) -> BoxFuture<Result<Option<Duration>, BackendError>> {
            ready(Ok(Some(self.0))).boxed()
        }
    }

    #[tokio::test]
    async fn uploads_land_under_the_prefix() {
        let store = memory_store();
        let uploader = Uploader::new(logger(), store.clone(), Limits::default())
            .with_prober(Arc::new(FixedProber(Duration::from_secs(324))));
        let session = UploadSession::new(mp3(200_000));

        let uploaded = uploader.upload(&session).await.expect("upload file");

        assert!(uploaded.name.starts_with("jazz-recordings/"));
        assert!(uploaded.name.ends_with("-Take-Five.mp3"));
        assert_eq!(
            uploaded.url.as_str(),
            format!("https://blobs.example.com/{}", uploaded.name)
        );
        assert_eq!(uploaded.duration, Some(Duration::from_secs(324)));
        assert_eq!(session.percent(), 100);
        assert!(!session.is_uploading());
        assert_eq!(
            store.get(&uploaded.name).map(|o| o.data.len()),
            Some(200_000)
        );
    }

    #[tokio::test]
    async fn non_audio_is_rejected_before_transfer() {
        let store = memory_store();
        let uploader = Uploader::new(logger(), store.clone(), Limits::default());
        let session = UploadSession::new(SelectedFile::new("notes.txt", "text/plain", vec![1]));

        let error = uploader.upload(&session).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(matches!(
            error,
            BackendError::Validation(ValidationError::InvalidType { .. })
        ));
        assert!(store.is_empty());
        assert_eq!(session.percent(), 0);
    }

    #[tokio::test]
    async fn oversized_files_are_rejected_before_transfer() {
        let store = memory_store();
        let uploader = Uploader::new(logger(), store.clone(), Limits::new(1_000, 500));
        let session = UploadSession::new(mp3(1_001));

        let error = uploader.upload(&session).await.unwrap_err();

        assert!(matches!(
            error,
            BackendError::Validation(ValidationError::TooLarge {
                size: 1_001,
                limit: 1_000
            })
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn large_files_go_through_the_reducer() {
        let store = memory_store();
        let uploader = Uploader::new(logger(), store.clone(), Limits::new(1_000, 500))
            .with_reducer(Arc::new(HalvingReducer));

        let uploaded = uploader
            .upload(&UploadSession::new(mp3(1_600)))
            .await
            .expect("upload reduced file");

        assert_eq!(uploaded.size, 800);
        assert!(uploaded.name.ends_with("-reduced.mp3"));

        // still too large after reduction
        let error = uploader
            .upload(&UploadSession::new(mp3(4_000)))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            BackendError::Validation(ValidationError::TooLarge { size: 2_000, .. })
        ));

        // under the threshold: untouched
        let uploaded = uploader
            .upload(&UploadSession::new(mp3(400)))
            .await
            .expect("upload small file");
        assert_eq!(uploaded.size, 400);
    }

    #[tokio::test]
    async fn transfer_failures_are_reported_with_their_cause() {
        let uploader = Uploader::new(logger(), Arc::new(FailingStore), Limits::default());
        let session = UploadSession::new(mp3(10));

        let error = uploader.upload(&session).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Transfer);
        assert!(error.to_string().contains("connection reset"));
        assert!(!session.is_uploading());
    }

    #[tokio::test]
    async fn cancelled_transfers_stop_reporting() {
        let uploader = Uploader::new(logger(), Arc::new(StallingStore), Limits::default());
        let session = UploadSession::new(mp3(10));
        let canceller = session.canceller();

        let (result, _) = tokio::join!(uploader.upload(&session), async move {
            tokio::task::yield_now().await;
            canceller.cancel();
        });

        assert!(matches!(result, Err(BackendError::UploadCancelled)));
        assert_eq!(session.percent(), 10);
        assert!(!session.is_uploading());

        // a cancelled session can't be restarted
        assert!(matches!(
            uploader.upload(&session).await,
            Err(BackendError::UploadCancelled)
        ));
    }
}
