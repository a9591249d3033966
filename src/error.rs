use std::io;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transaction API failed or answered with something other than a
    /// transaction list. `raw` holds the response body when one was received.
    #[error("invalid etherscan response: {reason}")]
    Upstream { reason: String, raw: Option<String> },

    #[error("failed to fetch historical ETH prices: {0}")]
    PriceUnavailable(String),

    #[error("cache i/o error on {path:?}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache database error: {0}")]
    CacheDb(#[from] sqlx::Error),
}

impl Error {
    pub fn upstream(reason: impl Into<String>, raw: Option<String>) -> Self {
        Error::Upstream {
            reason: reason.into(),
            raw,
        }
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Upstream { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }
}
