use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use lazy_static::lazy_static;
use serde::Deserialize;
use tokio::process::Command;

use crate::client::upload::SelectedFile;
use crate::errors::BackendError;
use crate::normalization::title_from_file_name;

/// Works out how long a piece of audio is.
pub trait Prober: Send + Sync {
    fn duration(&self, data: &[u8]) -> BoxFuture<Result<Option<Duration>, BackendError>>;
}

/// Makes an audio file smaller by re-encoding it.
pub trait Reducer: Send + Sync {
    fn reduce(&self, file: SelectedFile) -> BoxFuture<Result<SelectedFile, BackendError>>;
}

/// Formats a position or length as `m:ss`.
///
/// ```
/// use std::time::Duration;
/// use radio::audio::format_time;
/// assert_eq!(format_time(Duration::from_secs(324)), "5:24");
/// assert_eq!(format_time(Duration::from_millis(59_900)), "0:59");
/// ```
pub fn format_time(time: Duration) -> String {
    let seconds = time.as_secs();

    format!("{}:{:02}", seconds / 60, seconds % 60)
}

lazy_static! {
    static ref FFPROBE_ARGS: Vec<&'static str> =
        vec!["-hide_banner", "-v", "error", "-of", "json", "-show_format"];
}

/// The bit rate used when reducing files.
pub const REDUCED_BIT_RATE: &str = "128k";

const REDUCED_MIME_TYPE: &str = "audio/mpeg";
const REDUCED_EXTENSION: &str = "mp3";

/// Reads durations with `ffprobe`.
pub struct Ffprobe {
    path: PathBuf,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

impl Ffprobe {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Ffprobe {
            path: path.as_ref().to_owned(),
        }
    }
}

impl Prober for Ffprobe {
    fn duration(&self, data: &[u8]) -> BoxFuture<Result<Option<Duration>, BackendError>> {
        let data = data.to_vec();

        async move {
            let input = write_temporary(&data)?;

            let output = Command::new(&self.path)
                .args(FFPROBE_ARGS.iter())
                .arg(input.path())
                .output()
                .await
                .map_err(|source| BackendError::ToolFailed {
                    tool: "ffprobe",
                    source,
                })?;

            if !output.status.success() {
                return Err(BackendError::ToolExited {
                    tool: "ffprobe",
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }

            parse_ffprobe_duration(&output.stdout)
        }
        .boxed()
    }
}

fn parse_ffprobe_duration(stdout: &[u8]) -> Result<Option<Duration>, BackendError> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(BackendError::MalformedFfprobeOutput)?;

    // ffprobe reports "N/A" for streams it can't measure
    Ok(parsed
        .format
        .duration
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(Duration::from_secs_f64))
}

/// Re-encodes audio as constant bit rate MP3 with `ffmpeg`.
pub struct Ffmpeg {
    path: PathBuf,
    bit_rate: String,
}

impl Ffmpeg {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Ffmpeg {
            path: path.as_ref().to_owned(),
            bit_rate: REDUCED_BIT_RATE.to_owned(),
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: impl Into<String>) -> Self {
        self.bit_rate = bit_rate.into();
        self
    }
}

impl Reducer for Ffmpeg {
    fn reduce(&self, file: SelectedFile) -> BoxFuture<Result<SelectedFile, BackendError>> {
        async move {
            let input = write_temporary(file.data())?;
            let output_path = tempfile::Builder::new()
                .suffix(&format!(".{}", REDUCED_EXTENSION))
                .tempfile()
                .map_err(BackendError::TemporaryFileError)?
                .into_temp_path();

            let output = Command::new(&self.path)
                .args(&["-hide_banner", "-v", "error", "-y", "-i"])
                .arg(input.path())
                .args(&["-vn", "-codec:a", "libmp3lame", "-b:a", self.bit_rate.as_str()])
                .arg(&output_path)
                .output()
                .await
                .map_err(|source| BackendError::ToolFailed {
                    tool: "ffmpeg",
                    source,
                })?;

            if !output.status.success() {
                return Err(BackendError::ToolExited {
                    tool: "ffmpeg",
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }

            let data = tokio::fs::read(&output_path)
                .await
                .map_err(BackendError::TemporaryFileError)?;

            let name = format!(
                "{}.{}",
                title_from_file_name(file.name()),
                REDUCED_EXTENSION
            );

            Ok(SelectedFile::new(name, REDUCED_MIME_TYPE, data))
        }
        .boxed()
    }
}

fn write_temporary(data: &[u8]) -> Result<tempfile::NamedTempFile, BackendError> {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().map_err(BackendError::TemporaryFileError)?;

    file.write_all(data)
        .and_then(|_| file.flush())
        .map_err(BackendError::TemporaryFileError)?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffprobe_durations_are_parsed() {
        let measured = br#"{"format": {"filename": "x", "duration": "324.480000"}}"#;
        let unmeasured = br#"{"format": {"filename": "x", "duration": "N/A"}}"#;
        let missing = br#"{"format": {"filename": "x"}}"#;

        assert_eq!(
            parse_ffprobe_duration(measured)
                .expect("parse")
                .map(format_time),
            Some("5:24".to_owned())
        );
        assert_eq!(parse_ffprobe_duration(unmeasured).expect("parse"), None);
        assert_eq!(parse_ffprobe_duration(missing).expect("parse"), None);
        assert!(parse_ffprobe_duration(b"not json").is_err());
    }
}
