use std::time::Duration;

use url::Url;

use crate::recording::{Id, Recording};

/// The volume a new player starts at.
pub const DEFAULT_VOLUME: f32 = 0.7;

/// The thing that actually makes sound. Calls are fire-and-forget; the
/// element reports back through [`Player::time_update`] and
/// [`Player::track_ended`].
pub trait AudioElement {
    fn load(&mut self, url: &Url);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration);
    fn set_volume(&mut self, volume: f32);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// What `next` and `previous` do at the ends of the playlist.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundaryPolicy {
    /// Stay on the first or last track.
    Stop,

    /// Go round to the other end.
    Wrap,
}

impl Default for BoundaryPolicy {
    fn default() -> Self {
        BoundaryPolicy::Stop
    }
}

/// Drives one [`AudioElement`] through a playlist.
pub struct Player<A: AudioElement> {
    element: A,
    policy: BoundaryPolicy,
    recordings: Vec<Recording>,
    current: Option<usize>,
    state: PlaybackState,
    position: Duration,
    duration: Option<Duration>,
    volume: f32,
}

impl<A: AudioElement> Player<A> {
    pub fn new(mut element: A, policy: BoundaryPolicy) -> Self {
        element.set_volume(DEFAULT_VOLUME);

        Player {
            element,
            policy,
            recordings: vec![],
            current: None,
            state: PlaybackState::Idle,
            position: Duration::default(),
            duration: None,
            volume: DEFAULT_VOLUME,
        }
    }

    /// Re-renders against a refreshed playlist. The current track is kept
    /// if it is still there, reloading it if its audio moved; otherwise the
    /// player moves to whatever now sits at the same index, or the last
    /// track.
    pub fn set_playlist(&mut self, recordings: Vec<Recording>) {
        let previous: Option<(Id, Url)> = self.current_recording().map(|r| (r.id, r.url.clone()));
        let previous_index = self.current;

        self.recordings = recordings;

        if self.recordings.is_empty() {
            self.element.pause();
            self.current = None;
            self.reset_position();
            self.state = PlaybackState::Idle;
            return;
        }

        let kept = previous
            .as_ref()
            .and_then(|(id, _)| self.recordings.iter().position(|r| r.id == *id));

        let index = match (kept, previous) {
            (Some(index), Some((_, url))) if self.recordings[index].url == url => {
                self.current = Some(index);
                return;
            }
            (Some(index), _) => index,
            (None, _) => usize::min(previous_index.unwrap_or(0), self.recordings.len() - 1),
        };

        self.load(index);

        if self.state == PlaybackState::Playing {
            self.element.play();
        }
    }

    /// Plays when idle or paused, pauses when playing.
    pub fn toggle(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Idle | PlaybackState::Paused => self.play(),
        }
    }

    pub fn play(&mut self) {
        if self.recordings.is_empty() {
            return;
        }

        if self.current.is_none() {
            self.load(0);
        }

        self.element.play();
        self.state = PlaybackState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.element.pause();
            self.state = PlaybackState::Paused;
        }
    }

    /// Stops playback and rewinds the current track.
    pub fn stop(&mut self) {
        self.element.pause();

        if self.current.is_some() {
            self.element.seek(Duration::default());
        }

        self.position = Duration::default();
        self.state = PlaybackState::Idle;
    }

    /// Jumps to the track at `index` and plays it. Returns `false` if
    /// there's no such track.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.recordings.len() {
            return false;
        }

        self.load(index);
        self.element.play();
        self.state = PlaybackState::Playing;

        true
    }

    /// Moves to the next track, keeping the play state. Returns `false` if
    /// the player stayed where it was.
    pub fn next(&mut self) -> bool {
        let len = self.recordings.len();

        let target = match self.current {
            None if len > 0 => Some(0),
            None => None,
            Some(i) if i + 1 < len => Some(i + 1),
            Some(_) => match self.policy {
                BoundaryPolicy::Stop => None,
                BoundaryPolicy::Wrap => Some(0),
            },
        };

        self.advance_to(target)
    }

    /// Moves to the previous track, keeping the play state. Returns
    /// `false` if the player stayed where it was.
    pub fn previous(&mut self) -> bool {
        let len = self.recordings.len();

        let target = match self.current {
            None => None,
            Some(i) if i > 0 => Some(i - 1),
            Some(_) => match self.policy {
                BoundaryPolicy::Stop => None,
                BoundaryPolicy::Wrap => Some(len - 1),
            },
        };

        self.advance_to(target)
    }

    /// Called when the element reaches the end of a track. Moves on to the
    /// next one if there is one, whatever the boundary policy.
    pub fn track_ended(&mut self) {
        match self.current {
            Some(i) if i + 1 < self.recordings.len() => {
                self.load(i + 1);
                self.element.play();
                self.state = PlaybackState::Playing;
            }
            _ => {
                self.element.pause();
                self.reset_position();
                self.state = PlaybackState::Idle;
            }
        }
    }

    /// Moves the playhead, clamped to the track's length when known.
    pub fn seek(&mut self, position: Duration) {
        if self.current.is_none() {
            return;
        }

        let position = match self.duration {
            Some(duration) => Duration::min(position, duration),
            None => position,
        };

        self.element.seek(position);
        self.position = position;
    }

    /// Records the playhead and track length reported by the element.
    pub fn time_update(&mut self, position: Duration, duration: Option<Duration>) {
        self.position = position;

        if duration.is_some() {
            self.duration = duration;
        }
    }

    /// Sets the gain, clamped to `0.0..=1.0`. Not-a-number is ignored.
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            return;
        }

        let volume = volume.max(0.0).min(1.0);

        self.element.set_volume(volume);
        self.volume = volume;
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_recording(&self) -> Option<&Recording> {
        self.current.and_then(|i| self.recordings.get(i))
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn element(&self) -> &A {
        &self.element
    }

    fn advance_to(&mut self, target: Option<usize>) -> bool {
        let index = match target {
            Some(index) if Some(index) != self.current => index,
            _ => return false,
        };

        self.load(index);

        if self.state == PlaybackState::Playing {
            self.element.play();
        }

        true
    }

    fn load(&mut self, index: usize) {
        self.element.load(&self.recordings[index].url);
        self.current = Some(index);
        self.reset_position();
    }

    fn reset_position(&mut self) {
        self.position = Duration::default();
        self.duration = None;
    }
}

/// An element that makes no sound and only remembers what it was told,
/// for command-line use and tests.
#[derive(Debug, Default)]
pub struct Headless {
    source: Option<Url>,
    playing: bool,
    position: Duration,
    volume: f32,
}

impl Headless {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<&Url> {
        self.source.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }
}

impl AudioElement for Headless {
    fn load(&mut self, url: &Url) {
        self.source = Some(url.clone());
        self.playing = false;
        self.position = Duration::default();
    }

    fn play(&mut self) {
        self.playing = self.source.is_some();
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, position: Duration) {
        self.position = position;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::recording::NewRecording;

    fn recording(id: Id) -> Recording {
        Recording::new(
            id,
            NewRecording {
                title: format!("Track {}", id),
                description: String::new(),
                date: "2020-10-19".to_owned(),
                duration: "3:00".to_owned(),
                url: Url::parse(&format!("https://blobs.example.com/{}.mp3", id)).unwrap(),
            },
            OffsetDateTime::from_unix_timestamp(1_600_000_000 + id),
        )
    }

    fn player(policy: BoundaryPolicy, ids: &[Id]) -> Player<Headless> {
        let mut player = Player::new(Headless::new(), policy);
        player.set_playlist(ids.iter().copied().map(recording).collect());
        player
    }

    fn source(player: &Player<Headless>) -> Option<&str> {
        player.element().source().map(Url::as_str)
    }

    #[test]
    fn toggling_moves_between_playing_and_paused() {
        let mut player = player(BoundaryPolicy::Stop, &[1, 2, 3]);
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.current_index(), Some(0));

        player.toggle();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(player.element().is_playing());

        player.toggle();
        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(!player.element().is_playing());

        player.toggle();
        player.stop();
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.position(), Duration::default());
    }

    #[test]
    fn stop_policy_clamps_at_both_ends() {
        let mut player = player(BoundaryPolicy::Stop, &[1, 2, 3]);

        assert!(!player.previous());
        assert_eq!(player.current_index(), Some(0));

        player.select(2);
        assert!(!player.next());
        assert_eq!(player.current_index(), Some(2));
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn wrap_policy_goes_round() {
        let mut player = player(BoundaryPolicy::Wrap, &[1, 2, 3]);

        assert!(player.previous());
        assert_eq!(player.current_index(), Some(2));

        assert!(player.next());
        assert_eq!(player.current_index(), Some(0));
        assert_eq!(source(&player), Some("https://blobs.example.com/1.mp3"));
    }

    #[test]
    fn advancing_keeps_the_play_state() {
        let mut player = player(BoundaryPolicy::Stop, &[1, 2, 3]);

        player.play();
        assert!(player.next());
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(player.element().is_playing());

        player.pause();
        assert!(player.next());
        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(!player.element().is_playing());
        assert_eq!(source(&player), Some("https://blobs.example.com/3.mp3"));
    }

    #[test]
    fn ending_the_last_track_goes_idle_even_when_wrapping() {
        let mut player = player(BoundaryPolicy::Wrap, &[1, 2]);

        player.play();
        player.track_ended();
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.state(), PlaybackState::Playing);

        player.track_ended();
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(!player.element().is_playing());
    }

    #[test]
    fn refreshed_playlists_keep_the_current_track() {
        let mut player = player(BoundaryPolicy::Stop, &[3, 2, 1]);
        player.select(1);

        // a new recording arrives at the top
        player.set_playlist(vec![recording(4), recording(3), recording(2), recording(1)]);
        assert_eq!(player.current_index(), Some(2));
        assert_eq!(player.current_recording().map(|r| r.id), Some(2));
        assert_eq!(player.state(), PlaybackState::Playing);

        // the current recording is deleted
        player.set_playlist(vec![recording(4), recording(3)]);
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(source(&player), Some("https://blobs.example.com/3.mp3"));
        assert!(player.element().is_playing());

        player.set_playlist(vec![]);
        assert_eq!(player.current_index(), None);
        assert_eq!(player.state(), PlaybackState::Idle);

        player.toggle();
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[test]
    fn replaced_audio_is_reloaded() {
        let mut player = player(BoundaryPolicy::Stop, &[2, 1]);
        player.select(1);
        player.time_update(Duration::from_secs(42), Some(Duration::from_secs(180)));

        let mut replaced = recording(1);
        replaced.url = Url::parse("https://blobs.example.com/1-remaster.mp3").unwrap();
        player.set_playlist(vec![recording(2), replaced]);

        assert_eq!(player.current_index(), Some(1));
        assert_eq!(source(&player), Some("https://blobs.example.com/1-remaster.mp3"));
        assert_eq!(player.position(), Duration::default());
        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(player.element().is_playing());

        // paused players reload without starting
        player.pause();
        player.set_playlist(vec![recording(2), recording(1)]);
        assert_eq!(source(&player), Some("https://blobs.example.com/1.mp3"));
        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(!player.element().is_playing());
    }

    #[test]
    fn seeking_and_volume_are_clamped() {
        let mut player = player(BoundaryPolicy::Stop, &[1]);
        assert_eq!(player.volume(), DEFAULT_VOLUME);
        assert_eq!(player.element().volume(), DEFAULT_VOLUME);

        player.time_update(Duration::from_secs(5), Some(Duration::from_secs(180)));
        player.seek(Duration::from_secs(600));
        assert_eq!(player.position(), Duration::from_secs(180));
        assert_eq!(player.element().position(), Duration::from_secs(180));

        player.seek(Duration::from_secs(30));
        player.seek(Duration::from_secs(30));
        assert_eq!(player.position(), Duration::from_secs(30));

        player.set_volume(1.5);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(-0.2);
        assert_eq!(player.volume(), 0.0);
        player.set_volume(f32::NAN);
        assert_eq!(player.volume(), 0.0);
    }
}
