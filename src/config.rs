use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// The largest upload accepted by the server and the orchestrator.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Files above this size are offered to the reducer, if one exists.
pub const DEFAULT_REDUCE_ABOVE_BYTES: u64 = 45 * 1024 * 1024;

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Returns the parsed value of the named environment variable, or
/// `default` if it isn't set. Panics if it is set but unparseable.
pub fn get_variable_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("parse {} environment variable", name)),
        Err(_) => default,
    }
}

/// Size limits applied to uploads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Limits {
    pub max_upload_size: u64,
    pub reduce_above: u64,
}

impl Limits {
    pub fn new(max_upload_size: u64, reduce_above: u64) -> Self {
        Self {
            max_upload_size,
            reduce_above,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            get_variable_or("RADIO_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            get_variable_or("RADIO_REDUCE_ABOVE_BYTES", DEFAULT_REDUCE_ABOVE_BYTES),
        )
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_REDUCE_ABOVE_BYTES)
    }
}

/// Finds an external tool, preferring the configured location and falling
/// back to `$PATH`.
#[cfg(feature = "which")]
pub fn find_tool(name: &str, configured: Option<String>) -> Option<PathBuf> {
    use which::which;

    configured
        .map(PathBuf::from)
        .or_else(|| which(name).ok())
}

#[cfg(not(feature = "which"))]
pub fn find_tool(_name: &str, configured: Option<String>) -> Option<PathBuf> {
    configured.map(PathBuf::from)
}
