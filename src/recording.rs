use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::errors::ValidationError;
use crate::normalization;

/// An ID in the recording store.
pub type Id = i64;

/// The duration shown when none was given.
pub const UNKNOWN_DURATION: &str = "Unknown";

/// A single recording in the store.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Recording {
    /// The ID of the recording, assigned by the store.
    pub id: Id,

    /// The title. Never empty.
    pub title: String,

    /// The description, possibly empty.
    pub description: String,

    /// The date to display.
    pub date: String,

    /// The duration to display.
    pub duration: String,

    /// The location of the audio.
    pub url: Url,

    /// The date and time it was created, which orders the playlist.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

impl Recording {
    pub fn new(id: Id, recording: NewRecording, created_at: OffsetDateTime) -> Self {
        let NewRecording {
            title,
            description,
            date,
            duration,
            url,
        } = recording;

        Recording {
            id,
            title,
            description,
            date,
            duration,
            url,
            created_at,
        }
    }

    /// Returns the editable fields, e.g. to change some of them and send
    /// them back as an update.
    pub fn to_new(&self) -> NewRecording {
        NewRecording {
            title: self.title.clone(),
            description: self.description.clone(),
            date: self.date.clone(),
            duration: self.duration.clone(),
            url: self.url.clone(),
        }
    }
}

/// The submitted fields of a recording, as received from a form or an
/// API call. Everything is optional here so that missing fields turn
/// into validation errors rather than parse errors.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RecordingDraft {
    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub date: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub duration: Option<String>,

    #[serde(default, deserialize_with = "normalization::deserialize_option")]
    pub url: Option<String>,
}

impl RecordingDraft {
    /// Checks the required fields and fills in the defaults for the rest.
    pub fn validate(self) -> Result<NewRecording, ValidationError> {
        let clean = |field: Option<String>| {
            field
                .map(normalization::normalize_text)
                .filter(|s| !s.is_empty())
        };

        let title = clean(self.title).ok_or(ValidationError::MissingTitle)?;
        let url = clean(self.url).ok_or(ValidationError::MissingUrl)?;
        let url = Url::parse(&url).map_err(|source| ValidationError::InvalidUrl {
            url: url.clone(),
            source,
        })?;

        Ok(NewRecording {
            title,
            description: clean(self.description).unwrap_or_default(),
            date: clean(self.date).unwrap_or_else(today),
            duration: clean(self.duration).unwrap_or_else(|| UNKNOWN_DURATION.to_owned()),
            url,
        })
    }
}

/// A validated recording that has not been stored yet, or the full set
/// of fields replacing an existing one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NewRecording {
    pub title: String,
    pub description: String,
    pub date: String,
    pub duration: String,
    pub url: Url,
}

/// Today's date as shown by default, e.g. `2020-10-19`.
pub fn today() -> String {
    OffsetDateTime::now_utc().date().format("%Y-%m-%d")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: Option<&str>, url: Option<&str>) -> RecordingDraft {
        RecordingDraft {
            title: title.map(str::to_owned),
            url: url.map(str::to_owned),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_are_filled_in() {
        let recording = draft(Some(" Take Five "), Some("https://blobs.example.com/a.mp3"))
            .validate()
            .expect("validate draft");

        assert_eq!(recording.title, "Take Five");
        assert_eq!(recording.description, "");
        assert_eq!(recording.duration, UNKNOWN_DURATION);
        assert_eq!(recording.date, today());
    }

    #[test]
    fn title_and_url_are_required() {
        assert!(matches!(
            draft(Some("   "), Some("https://blobs.example.com/a.mp3")).validate(),
            Err(ValidationError::MissingTitle)
        ));
        assert!(matches!(
            draft(Some("Blue in Green"), None).validate(),
            Err(ValidationError::MissingUrl)
        ));
        assert!(matches!(
            draft(Some("Blue in Green"), Some("not a url")).validate(),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn drafts_deserialize_from_partial_json() {
        let draft: RecordingDraft = serde_json::from_str(
            r#"{"title": "  So What ", "description": "", "url": "https://blobs.example.com/b.ogg"}"#,
        )
        .expect("parse draft");

        assert_eq!(draft.title.as_deref(), Some("So What"));
        assert_eq!(draft.description, None);
        assert_eq!(draft.date, None);
    }

    #[test]
    fn recordings_serialize_timestamps_as_seconds() {
        let new = draft(Some("Naima"), Some("https://blobs.example.com/n.flac"))
            .validate()
            .expect("validate draft");
        let recording = Recording::new(7, new, OffsetDateTime::from_unix_timestamp(1_600_000_000));

        let json = serde_json::to_value(&recording).expect("serialize recording");

        assert_eq!(json["id"], 7);
        assert_eq!(json["created_at"], 1_600_000_000);
        assert_eq!(json["url"], "https://blobs.example.com/n.flac");
    }
}
