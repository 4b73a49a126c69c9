//! Build information shared by the server, the helpers and the logger.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const REVISION: Option<&str> = option_env!("RADIO_REVISION");

pub const BUILD_TIMESTAMP: Option<&str> = option_env!("BUILD_TIMESTAMP");

/// The name reported by the health check and used as a user agent.
pub const NAME: &str = "jazz-radio";
