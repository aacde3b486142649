//! Error taxonomy for kiosk interactions
//!
//! None of these are fatal to the coordinator. Decode misses are not errors at
//! all and travel as `ScanError` instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("no session selected")]
    NoSession,

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, KioskError>;
