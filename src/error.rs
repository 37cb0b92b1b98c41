use std::io;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

/// Problems found while assembling the service configuration.
/// Nothing is bound when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one listener is required")]
    MissingListener,

    #[error("illegal target server port {value:?}: {source}")]
    InvalidTargetPort {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("illegal target server {0:?}")]
    InvalidTarget(String),

    #[error("--target cannot be combined with the bounce profile")]
    ConflictingTarget,

    #[error("cannot read introduction file {}: {source}", path.display())]
    ReadIntroduction {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot read config file {}: {source}", path.display())]
    ReadConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file {}: {source}", path.display())]
    ParseConfigFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("session timeout {timeout:?} must be longer than the linger delay {linger:?}")]
    SessionTimeoutTooShort { timeout: Duration, linger: Duration },

    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
}

/// A listener address that could not be bound.
#[derive(Debug, thiserror::Error)]
#[error("listen tcp {address}: {source}")]
pub struct BindError {
    pub address: String,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to listen on one or more addresses: {0}")]
    Bind(#[from] BindError),
}

impl Error {
    /// Process exit code for this failure: 1 for configuration, 2 for binding.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 1,
            Error::Bind(_) => 2,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
