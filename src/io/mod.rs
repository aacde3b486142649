//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `backend` - HTTP client for `/checkin` and `/sync_airtable`
//! - `scanner` - Decoder sources (stdin, serial, in-process channel)
//! - `console` - Logs screen changes on headless kiosks
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod backend;
pub mod console;
pub mod prometheus;
pub mod scanner;

// Re-export commonly used types
pub use backend::{BackendClient, CheckinService, SyncService};
pub use scanner::{ChannelScanner, DecoderSource, SerialScanner, StdinScanner};
