use std::io;

use thiserror::Error;

/// Coarse classification used by callers that only care about the failure family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Decode,
    InvalidArgument,
    PartialRead,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("IO error: {0}")]
    Io(#[source] io::Error),
    #[error("Operation timed out")]
    Timeout,
    #[error("No device connected")]
    NotConnected,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Read of channel {channel} failed: {source}")]
    PartialRead {
        channel: u8,
        #[source]
        source: Box<Error>,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(e),
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport(_)
            | Error::Io(_)
            | Error::Timeout
            | Error::NotConnected
            | Error::Csv(_)
            | Error::Config(_) => ErrorKind::Transport,
            Error::Decode(_) | Error::Json(_) => ErrorKind::Decode,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::PartialRead { .. } => ErrorKind::PartialRead,
        }
    }

    /// Failures of the link itself, the only ones worth retrying
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Io(_) | Error::Timeout
        )
    }

    pub fn partial(channel: u8, source: Error) -> Self {
        Error::PartialRead { channel, source: Box::new(source) }
    }
}

pub(crate) fn transport(msg: &str) -> Error {
    Error::Transport(msg.to_owned())
}

pub(crate) fn decode(msg: impl Into<String>) -> Error {
    Error::Decode(msg.into())
}

pub(crate) fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidArgument(msg.into())
}
