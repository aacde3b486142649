//! Domain models - scan events, check-in contracts and screen state
//!
//! This module contains the canonical data types used throughout the system:
//! - `ScanEvent` / `ScanError` / `DecoderEvent` - what scanners report
//! - `CheckinRequest` / `CheckinResponse` - the `/checkin` contract
//! - `SyncRequest` / `SyncResponse` - the `/sync_airtable` contract
//! - `ScreenState` - everything the kiosk display shows
//! - `KioskError` - interaction-level failures

pub mod error;
pub mod types;

pub use error::KioskError;
pub use types::{
    CheckinRequest, CheckinResponse, DecoderEvent, ResultStyle, ResultView, ScanError, ScanEvent,
    ScanSettings, ScannerStatus, ScreenState, SyncRequest, SyncResponse,
};
