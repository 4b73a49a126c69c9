use url::Url;

use crate::recording::Id;

/// Convenience wrapper for URL generation functions.
#[derive(Clone, Debug)]
pub struct Urls {
    /// Top-level URL, including trailing slash.
    base: Url,

    /// Path for all recordings-related actions.
    pub(crate) recordings_path: String,

    /// Path for blob uploads.
    pub(crate) upload_path: String,
}

impl Urls {
    /// Create a new instance. The paths should *not* include slashes.
    pub fn new(
        base: impl AsRef<str>,
        recordings_path: impl Into<String>,
        upload_path: impl Into<String>,
    ) -> Self {
        let base =
            Url::parse(base.as_ref()).unwrap_or_else(|_| panic!("parse {} as URL", base.as_ref()));

        Urls::with_base(base, recordings_path, upload_path)
    }

    pub fn with_base(
        mut base: Url,
        recordings_path: impl Into<String>,
        upload_path: impl Into<String>,
    ) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Urls {
            base,
            recordings_path: recordings_path.into(),
            upload_path: upload_path.into(),
        }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn recordings(&self) -> Url {
        self.join(&self.recordings_path)
    }

    pub fn recording(&self, id: Id) -> Url {
        self.join(&format!("{}/{}", self.recordings_path, id))
    }

    pub fn count(&self) -> Url {
        self.join(&format!("{}/count", self.recordings_path))
    }

    pub fn upload(&self) -> Url {
        self.join(&self.upload_path)
    }

    fn join(&self, path: &str) -> Url {
        self.base
            .join(path)
            .unwrap_or_else(|_| panic!("get URL for {}", path))
    }
}
