use thiserror::Error;

use crate::types::ZoneIndex;

#[derive(Debug, Error)]
pub enum Error {
    /// Connection refused, DNS failure or request timeout.
    #[error("device unreachable: {0}")]
    Unreachable(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The device answered with an explicit error status.
    #[error("rejected by device: {0}")]
    Rejected(String),
    #[error("invalid zone: {0}")]
    InvalidZone(ZoneIndex),
    #[error("target {value}\u{00b0}C out of range for zone {zone} ({min}..={max})")]
    OutOfRange {
        zone: ZoneIndex,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("zone {0} has no known state yet")]
    NotReady(ZoneIndex),
    #[error("mode {mode} not supported by zone {zone}")]
    UnsupportedMode { zone: ZoneIndex, mode: String },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Errors raised by the transport or the device itself, as opposed to
    /// local validation.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::Unreachable(_) | Error::MalformedResponse(_) | Error::Rejected(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Error::Rejected(format!("HTTP {status}"))
        } else {
            Error::Unreachable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedResponse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
