//! The station's client side: uploading, keeping the playlist in step
//! with the recording store, and playing it.

pub mod player;
pub mod playlist;
pub mod remote;
pub mod station;
pub mod upload;

pub use player::{AudioElement, BoundaryPolicy, PlaybackState, Player};
pub use playlist::Playlist;
pub use remote::{RemoteDb, RemoteStore};
pub use station::{RecordingForm, Station};
pub use upload::{SelectedFile, UploadSession, Uploaded, Uploader};
