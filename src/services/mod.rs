//! Services - kiosk decision logic and state management
//!
//! This module contains the core business logic services:
//! - `coordinator` - Event loop owning scan state and the presenter
//! - `debounce` - Duplicate suppression (window and trailing policies)
//! - `presenter` - Timed result display
//! - `session` - Operator session selection
//! - `sync` - Password-gated roster sync

pub mod coordinator;
pub mod debounce;
pub mod presenter;
pub mod session;
pub mod sync;

// Re-export commonly used types
pub use coordinator::ScanCoordinator;
pub use debounce::{ScanDecision, ScanState};
pub use presenter::ResultPresenter;
pub use session::SessionSelector;
pub use sync::{SyncOutcome, SyncStatus, SyncTrigger};
