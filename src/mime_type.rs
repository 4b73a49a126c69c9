use std::path::Path;

use mime::Mime;

use crate::errors::ValidationError;

/// The audio types accepted for upload. `audio/mp3` is a common alias of
/// `audio/mpeg` sent by some browsers.
pub const ACCEPTED_ESSENCES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/m4a",
    "audio/aac",
    "audio/ogg",
    "audio/flac",
];

/// Parses `content_type` and checks it against the allowlist, ignoring
/// any parameters.
///
/// ```
/// use radio::mime_type::check_audio_type;
/// assert!(check_audio_type("audio/ogg; codecs=opus").is_ok());
/// assert!(check_audio_type("text/plain").is_err());
/// ```
pub fn check_audio_type(content_type: &str) -> Result<Mime, ValidationError> {
    let invalid = || ValidationError::InvalidType {
        mime_type: content_type.to_owned(),
    };

    let parsed: Mime = content_type.trim().parse().map_err(|_| invalid())?;

    let essence = parsed.essence_str().to_ascii_lowercase();

    if ACCEPTED_ESSENCES.contains(&essence.as_str()) {
        Ok(parsed)
    } else {
        Err(invalid())
    }
}

/// Guesses the content type of a local file from its extension.
pub fn guess_from_path(path: impl AsRef<Path>) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}
