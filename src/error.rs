use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device cannot take more bytes right now. Safe to retry.
    #[error("transport busy")]
    Busy,

    #[error("failed to open transport: {0}")]
    Open(String),

    #[error("transport disconnected: {0}")]
    Disconnected(String),

    #[error("transport is not open")]
    NotOpen,

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Busy)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    #[error("transport stayed busy after {retries} retries ({written} of {len} bytes written)")]
    Stalled {
        retries: u32,
        written: usize,
        len: usize,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("malformed MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Delivery(#[from] PacerError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("a playback session is active")]
    Busy,

    #[error("no event stream loaded")]
    NothingLoaded,
}

pub type Result<T> = std::result::Result<T, Error>;
