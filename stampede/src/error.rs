use stampede_core::ConfigError;
use thiserror::Error;

/// Engine errors. Configuration errors are fatal at startup; transport
/// errors surface to the journey that issued the request and are
/// recovered at the iteration boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
