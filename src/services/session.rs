//! Operator session selection
//!
//! The selected session class is published on a watch channel; the
//! coordinator reads it at forwarding time.

use crate::domain::error::{KioskError, Result};
use crate::infra::config::Config;
use tokio::sync::watch;
use tracing::info;

pub struct SessionSelector {
    options: Vec<String>,
    tx: watch::Sender<Option<String>>,
}

impl SessionSelector {
    pub fn new(config: &Config) -> Self {
        let initial = config.default_session().map(str::to_string);
        let (tx, _rx) = watch::channel(initial);
        Self { options: config.session_options().to_vec(), tx }
    }

    /// Choose a session. Must be one of the configured options when any exist.
    pub fn select(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KioskError::UnknownSession(name.to_string()));
        }
        if !self.options.is_empty() && !self.options.iter().any(|o| o == name) {
            return Err(KioskError::UnknownSession(name.to_string()));
        }
        info!(session = %name, "session_selected");
        self.tx.send_replace(Some(name.to_string()));
        Ok(())
    }

    pub fn clear(&self) {
        info!("session_cleared");
        self.tx.send_replace(None);
    }

    /// Advance to the next configured option, wrapping around
    pub fn cycle_next(&self) -> Option<String> {
        if self.options.is_empty() {
            return self.current();
        }
        let next = match self.current() {
            Some(cur) => match self.options.iter().position(|o| *o == cur) {
                Some(i) => self.options[(i + 1) % self.options.len()].clone(),
                None => self.options[0].clone(),
            },
            None => self.options[0].clone(),
        };
        info!(session = %next, "session_selected");
        self.tx.send_replace(Some(next.clone()));
        Some(next)
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}
