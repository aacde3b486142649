//! Shared types for the check-in kiosk

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Colour value the backend uses to signal a successful check-in
pub const SUCCESS_COLOR: &str = "green";

/// Sync status value the backend uses to signal success
pub const SYNC_SUCCESS_STATUS: &str = "success";

/// Shown when a check-in request fails at the transport level
pub const CHECKIN_FAILURE_MESSAGE: &str = "Error checking in. Please try again.";

/// Shown when a sync request fails at the transport level
pub const SYNC_FAILURE_MESSAGE: &str = "Sync failed. Please try again.";

/// Shown while a sync request is in flight
pub const SYNC_PENDING_MESSAGE: &str = "Syncing…";

/// Shown to the operator when a scan arrives before a session is chosen
pub const NO_SESSION_NOTICE: &str = "Please select a session before scanning.";

/// A successful decode from the scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub text: String,
    pub observed_at: Instant,
}

impl ScanEvent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), observed_at: Instant::now() }
    }
}

/// A decode miss (code out of frame, garbled read). Expected noise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub reason: String,
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Everything a decoder source can report to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// Device acquired, scanning is live
    Started,
    Decoded(ScanEvent),
    Failed(ScanError),
    /// Device could not be acquired; the source has stopped for good
    Unavailable(String),
}

/// Body of `POST /checkin`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRequest {
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_class: Option<String>,
}

/// Body returned by `POST /checkin`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinResponse {
    pub message: String,
    #[serde(default)]
    pub screen_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CheckinResponse {
    pub fn style(&self) -> ResultStyle {
        ResultStyle::from_screen_color(&self.screen_color)
    }
}

/// Body of `POST /sync_airtable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub password: String,
}

/// Body returned by `POST /sync_airtable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub status: String,
    pub message: String,
}

impl SyncResponse {
    pub fn style(&self) -> ResultStyle {
        if self.status == SYNC_SUCCESS_STATUS {
            ResultStyle::Success
        } else {
            ResultStyle::Failure
        }
    }
}

/// Visual classification of a displayed message. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStyle {
    Success,
    Failure,
}

impl ResultStyle {
    /// Anything other than "green" is a failure
    pub fn from_screen_color(color: &str) -> Self {
        if color == SUCCESS_COLOR {
            ResultStyle::Success
        } else {
            ResultStyle::Failure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStyle::Success => "success",
            ResultStyle::Failure => "failure",
        }
    }
}

/// A message together with its styling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    pub message: String,
    pub style: ResultStyle,
}

impl ResultView {
    pub fn new(message: impl Into<String>, style: ResultStyle) -> Self {
        Self { message: message.into(), style }
    }
}

/// Scanner status line shown above the result area
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScannerStatus {
    #[default]
    Loading,
    Ready,
    /// Persistent until restart
    Failed(String),
}

impl ScannerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerStatus::Loading => "loading",
            ScannerStatus::Ready => "ready",
            ScannerStatus::Failed(_) => "failed",
        }
    }
}

/// Everything the kiosk screen shows at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScreenState {
    pub scanner: ScannerStatus,
    /// `None` means the result area is hidden
    pub result: Option<ResultView>,
    /// Operator notice, e.g. a missing session
    pub notice: Option<String>,
    pub session: Option<String>,
}

/// Settings handed to a decoder source when it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// Camera preference, e.g. "environment" for the rear camera
    pub facing_mode: String,
    pub fps: u32,
    pub qrbox_width: u32,
    pub qrbox_height: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self { facing_mode: "environment".to_string(), fps: 10, qrbox_width: 250, qrbox_height: 250 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_from_screen_color() {
        assert_eq!(ResultStyle::from_screen_color("green"), ResultStyle::Success);
        assert_eq!(ResultStyle::from_screen_color("red"), ResultStyle::Failure);
        assert_eq!(ResultStyle::from_screen_color("Green"), ResultStyle::Failure);
        assert_eq!(ResultStyle::from_screen_color(""), ResultStyle::Failure);
    }

    #[test]
    fn test_checkin_request_omits_missing_session() {
        let req = CheckinRequest { phone_number: "5551234567".to_string(), session_class: None };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"phone_number":"5551234567"}"#);

        let req = CheckinRequest {
            phone_number: "5551234567".to_string(),
            session_class: Some("Adults".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"phone_number":"5551234567","session_class":"Adults"}"#);
    }

    #[test]
    fn test_checkin_response_missing_color_is_failure() {
        let resp: CheckinResponse =
            serde_json::from_str(r#"{"status":"error","message":"Phone number missing"}"#).unwrap();
        assert_eq!(resp.style(), ResultStyle::Failure);
        assert_eq!(resp.status.as_deref(), Some("error"));
    }

    #[test]
    fn test_sync_response_style() {
        let ok = SyncResponse { status: "success".to_string(), message: "done".to_string() };
        let err = SyncResponse { status: "error".to_string(), message: "Unauthorized".to_string() };
        assert_eq!(ok.style(), ResultStyle::Success);
        assert_eq!(err.style(), ResultStyle::Failure);
    }
}
