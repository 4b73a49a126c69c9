use std::sync::Arc;

use log::{debug, o, warn, Logger};
use url::Url;

use crate::audio::format_time;
use crate::client::player::{AudioElement, Player};
use crate::client::playlist::Playlist;
use crate::client::upload::{UploadSession, Uploaded, Uploader};
use crate::errors::{BackendError, ValidationError};
use crate::normalization::title_from_file_name;
use crate::recording::{Id, NewRecording, Recording, RecordingDraft};

/// What the add and edit forms submit: the typed-in fields, plus a file
/// if one was attached.
pub struct RecordingForm {
    pub draft: RecordingDraft,
    pub upload: Option<UploadSession>,
}

impl RecordingForm {
    pub fn new(draft: RecordingDraft) -> Self {
        RecordingForm {
            draft,
            upload: None,
        }
    }

    pub fn with_upload(mut self, session: UploadSession) -> Self {
        self.upload = Some(session);
        self
    }
}

/// Ties the pieces together: a user action goes through the uploader if a
/// file is attached, then to the recording store, then the playlist is
/// re-listed and the player re-rendered against it.
pub struct Station<A: AudioElement> {
    logger: Arc<Logger>,
    uploader: Uploader,
    playlist: Playlist,
    player: Player<A>,
}

impl<A: AudioElement> Station<A> {
    pub fn new(logger: Arc<Logger>, uploader: Uploader, playlist: Playlist, player: Player<A>) -> Self {
        Station {
            logger,
            uploader,
            playlist,
            player,
        }
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn player(&self) -> &Player<A> {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player<A> {
        &mut self.player
    }

    /// Re-lists the playlist and hands it to the player.
    pub async fn refresh(&mut self) -> Result<&[Recording], BackendError> {
        let recordings = self.playlist.list().await?;
        self.player.set_playlist(recordings);

        Ok(self.player.recordings())
    }

    /// Adds a recording, uploading its file first if one is attached. The
    /// upload is discarded again if the insert fails.
    pub async fn add(&mut self, form: RecordingForm) -> Result<Recording, BackendError> {
        let RecordingForm { draft, upload } = form;

        let (recording, uploaded) = self.prepare(draft, upload.as_ref()).await?;

        let result = self.playlist.add(recording).await;

        if let (Err(e), Some(uploaded)) = (&result, &uploaded) {
            if e.persisted().is_none() {
                self.discard_blob(&uploaded.url).await;
            }
        }

        self.render();

        result
    }

    /// Replaces a recording. Without an attached file the recording keeps
    /// its audio; with one, the new audio replaces the old, which is then
    /// deleted. Uploaded audio is only discarded if the update itself
    /// failed.
    pub async fn edit(&mut self, id: Id, form: RecordingForm) -> Result<Recording, BackendError> {
        let RecordingForm { mut draft, upload } = form;

        let previous_url = self
            .playlist
            .recordings()
            .into_iter()
            .find(|r| r.id == id)
            .map(|r| r.url);

        if draft.url.is_none() {
            draft.url = previous_url.as_ref().map(Url::to_string);
        }

        let (recording, uploaded) = self.prepare(draft, upload.as_ref()).await?;

        let result = self.playlist.update(id, recording).await;

        let stored_url = match &result {
            Ok(updated) => Some(updated.url.clone()),
            Err(e) => e.persisted().map(|r| r.url.clone()),
        };

        if let Some(uploaded) = &uploaded {
            match (stored_url, previous_url) {
                (Some(stored_url), Some(previous_url)) if previous_url != stored_url => {
                    self.discard_blob(&previous_url).await
                }
                (Some(_), _) => {}
                (None, _) => self.discard_blob(&uploaded.url).await,
            }
        }

        self.render();

        result
    }

    pub async fn remove(&mut self, id: Id) -> Result<(), BackendError> {
        self.playlist.remove(id).await?;
        self.render();

        Ok(())
    }

    /// Removes every recording. The player is re-rendered against whatever
    /// survived, even when some deletions fail.
    pub async fn clear(&mut self) -> Result<Vec<Recording>, BackendError> {
        let result = self.playlist.remove_all().await;
        self.render();

        result
    }

    /// Fills in what the attached file can tell us, checks the draft, and
    /// only then uploads.
    async fn prepare(
        &self,
        mut draft: RecordingDraft,
        upload: Option<&UploadSession>,
    ) -> Result<(NewRecording, Option<Uploaded>), BackendError> {
        let session = match upload {
            Some(session) => session,
            None => return Ok((draft.validate()?, None)),
        };

        if draft.title.is_none() {
            let title = title_from_file_name(session.file().name());
            draft.title = Some(title).filter(|t| !t.is_empty());
        }

        if draft.title.is_none() {
            return Err(ValidationError::MissingTitle.into());
        }

        self.uploader.validate(session.file())?;

        let uploaded = self.uploader.upload(session).await?;
        let logger = self.logger.new(o!("url" => uploaded.url.to_string()));

        draft.url = Some(uploaded.url.to_string());

        if draft.duration.is_none() {
            draft.duration = uploaded.duration.map(format_time);
        }

        match draft.validate() {
            Ok(recording) => {
                debug!(logger, "Prepared recording from upload");
                Ok((recording, Some(uploaded)))
            }
            Err(e) => {
                self.discard_blob(&uploaded.url).await;
                Err(e.into())
            }
        }
    }

    async fn discard_blob(&self, url: &Url) {
        if let Err(e) = self.uploader.store().delete(url).await {
            warn!(self.logger, "Failed to delete blob"; "url" => %url, "error" => %e);
        }
    }

    fn render(&mut self) {
        self.player.set_playlist(self.playlist.recordings());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::{ready, BoxFuture, FutureExt};

    use super::*;
    use crate::audio::Prober;
    use crate::client::player::{BoundaryPolicy, Headless, PlaybackState};
    use crate::client::upload::SelectedFile;
    use crate::config::Limits;
    use crate::db::memory::MemoryDb;
    use crate::db::Db;
    use crate::errors::ErrorKind;
    use crate::store::memory::MemoryStore;

    struct FixedProber;

    impl Prober for FixedProber {
        fn duration(&self, _data: &[u8]) -> BoxFuture<Result<Option<Duration>, BackendError>> {
            ready(Ok(Some(Duration::from_secs(324)))).boxed()
        }
    }

    /// Lists fine but refuses every insert.
    struct ReadOnlyDb(MemoryDb);

    impl Db for ReadOnlyDb {
        fn count_all(&self) -> BoxFuture<Result<i64, BackendError>> {
            self.0.count_all()
        }

        fn delete(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            self.0.delete(id)
        }

        fn insert(&self, _recording: NewRecording) -> BoxFuture<Result<Recording, BackendError>> {
            ready(Err(BackendError::StoreRejected {
                status: 503,
                message: "read only".to_owned(),
            }))
            .boxed()
        }

        fn list(&self) -> BoxFuture<Result<Vec<Recording>, BackendError>> {
            self.0.list()
        }

        fn retrieve(&self, id: Id) -> BoxFuture<Result<Option<Recording>, BackendError>> {
            self.0.retrieve(id)
        }

        fn update(
            &self,
            id: Id,
            recording: NewRecording,
        ) -> BoxFuture<Result<Recording, BackendError>> {
            self.0.update(id, recording)
        }
    }

    /// Stores fine but can never list.
    struct UnlistableDb(MemoryDb);

    impl Db for UnlistableDb {
        fn count_all(&self) -> BoxFuture<Result<i64, BackendError>> {
            self.0.count_all()
        }

        fn delete(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            self.0.delete(id)
        }

        fn insert(&self, recording: NewRecording) -> BoxFuture<Result<Recording, BackendError>> {
            self.0.insert(recording)
        }

        fn list(&self) -> BoxFuture<Result<Vec<Recording>, BackendError>> {
            ready(Err(BackendError::StoreRejected {
                status: 503,
                message: "unavailable".to_owned(),
            }))
            .boxed()
        }

        fn retrieve(&self, id: Id) -> BoxFuture<Result<Option<Recording>, BackendError>> {
            self.0.retrieve(id)
        }

        fn update(
            &self,
            id: Id,
            recording: NewRecording,
        ) -> BoxFuture<Result<Recording, BackendError>> {
            self.0.update(id, recording)
        }
    }

    fn station(db: Arc<dyn Db + Send + Sync>) -> (Station<Headless>, Arc<MemoryStore>) {
        let logger = Arc::new(log::discard());
        let store = Arc::new(MemoryStore::new(
            Url::parse("https://blobs.example.com/").unwrap(),
        ));

        let uploader = Uploader::new(logger.clone(), store.clone(), Limits::default())
            .with_prober(Arc::new(FixedProber));
        let playlist = Playlist::new(logger.clone(), db);
        let player = Player::new(Headless::new(), BoundaryPolicy::Stop);

        (Station::new(logger, uploader, playlist, player), store)
    }

    fn mp3(name: &str) -> UploadSession {
        UploadSession::new(SelectedFile::new(name, "audio/mpeg", vec![0xff; 1024]))
    }

    fn draft(title: Option<&str>) -> RecordingDraft {
        RecordingDraft {
            title: title.map(str::to_owned),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn take_five_round_trip() {
        let (mut station, store) = station(Arc::new(MemoryDb::new()));

        let added = station
            .add(RecordingForm::new(draft(Some("Take Five"))).with_upload(mp3("take-five.mp3")))
            .await
            .expect("add recording");
        assert_eq!(added.duration, "5:24");
        assert_eq!(store.len(), 1);
        assert_eq!(station.refresh().await.expect("refresh").len(), 1);

        let edited = station
            .edit(added.id, RecordingForm::new(draft(Some("Take Five (Live)"))))
            .await
            .expect("edit recording");
        assert_eq!(edited.url, added.url);
        assert_eq!(station.playlist().recordings()[0].title, "Take Five (Live)");

        station.player_mut().play();
        station.remove(added.id).await.expect("remove recording");
        assert!(station.playlist().recordings().is_empty());
        assert_eq!(station.player().state(), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn titles_come_from_file_names() {
        let (mut station, _) = station(Arc::new(MemoryDb::new()));

        let added = station
            .add(RecordingForm::new(draft(None)).with_upload(mp3("Blue in Green.flac")))
            .await
            .expect("add recording");

        assert_eq!(added.title, "Blue in Green");
        assert_eq!(station.player().current_recording().map(|r| r.id), Some(added.id));
    }

    #[tokio::test]
    async fn missing_titles_fail_before_uploading() {
        let (mut station, store) = station(Arc::new(MemoryDb::new()));

        let error = station.add(RecordingForm::new(draft(None))).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);

        let error = station
            .add(RecordingForm::new(draft(None)).with_upload(mp3("  .mp3")))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            BackendError::Validation(ValidationError::MissingTitle)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn replaced_audio_is_deleted() {
        let (mut station, store) = station(Arc::new(MemoryDb::new()));

        let added = station
            .add(RecordingForm::new(draft(Some("Naima"))).with_upload(mp3("naima.mp3")))
            .await
            .expect("add recording");

        let edited = station
            .edit(
                added.id,
                RecordingForm::new(draft(Some("Naima"))).with_upload(mp3("naima-remaster.mp3")),
            )
            .await
            .expect("edit recording");

        assert_ne!(edited.url, added.url);
        assert_eq!(store.len(), 1);
        assert!(store.keys()[0].ends_with("-naima-remaster.mp3"));
    }

    #[tokio::test]
    async fn the_player_follows_replaced_audio() {
        let (mut station, _) = station(Arc::new(MemoryDb::new()));

        let added = station
            .add(RecordingForm::new(draft(Some("Naima"))).with_upload(mp3("naima.mp3")))
            .await
            .expect("add recording");

        station.player_mut().play();
        assert_eq!(station.player().element().source(), Some(&added.url));

        let edited = station
            .edit(
                added.id,
                RecordingForm::new(draft(Some("Naima"))).with_upload(mp3("naima2.mp3")),
            )
            .await
            .expect("edit recording");

        assert_eq!(station.player().element().source(), Some(&edited.url));
        assert_eq!(station.player().state(), PlaybackState::Playing);
        assert!(station.player().element().is_playing());
    }

    #[tokio::test]
    async fn stored_uploads_are_kept_when_listing_fails() {
        let db = Arc::new(UnlistableDb(MemoryDb::new()));
        let (mut station, store) = station(db.clone());

        let error = station
            .add(RecordingForm::new(draft(Some("Giant Steps"))).with_upload(mp3("giant-steps.mp3")))
            .await
            .unwrap_err();

        let stored = error.persisted().cloned().expect("recording was stored");
        assert_eq!(db.0.count_all().await.expect("count"), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&store.keys()[0]).is_some());
        assert!(stored.url.as_str().ends_with(&store.keys()[0]));

        let error = station
            .edit(
                stored.id,
                RecordingForm::new(draft(Some("Giant Steps"))).with_upload(mp3("giant-steps-2.mp3")),
            )
            .await
            .unwrap_err();

        let updated = error.persisted().cloned().expect("update was stored");
        assert!(updated.url.as_str().ends_with("-giant-steps-2.mp3"));
        assert!(store
            .keys()
            .iter()
            .any(|key| updated.url.as_str().ends_with(key.as_str())));
    }

    #[tokio::test]
    async fn failed_inserts_clean_up_their_upload() {
        let (mut station, store) = station(Arc::new(ReadOnlyDb(MemoryDb::new())));

        let error = station
            .add(RecordingForm::new(draft(Some("So What"))).with_upload(mp3("so-what.mp3")))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Store);
        assert!(store.is_empty());
    }
}
