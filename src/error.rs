use thiserror::Error;

/// Errors surfaced by the sync engine.
///
/// Each variant corresponds to one row of the error-kind table: the
/// propagation policy (fatal to the pass, fatal to one action, or logged and
/// skipped) lives with the caller, not on the error itself.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("server at {url} did not identify as Nextcloud")]
    NotNextcloud { url: String },

    #[error("TLS certificate for {host} was rejected")]
    TlsUntrusted { host: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("network error talking to {url}: {source}")]
    NetworkIo {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("malformed PROPFIND response: {reason}")]
    DavXmlMalformed { reason: String },

    #[error("filesystem error at {path}: {source}")]
    FilesystemIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("state store error: {0}")]
    StateStoreIo(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no pairs configured")]
    NoPairs,
}

pub type Result<T> = std::result::Result<T, SyncError>;
