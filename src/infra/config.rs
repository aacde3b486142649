//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/kiosk.toml

use crate::domain::types::ScanSettings;
use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerSource {
    Stdin,
    Serial,
}

impl ScannerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerSource::Stdin => "stdin",
            ScannerSource::Serial => "serial",
        }
    }
}

/// How repeated decodes are collapsed into check-ins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebouncePolicy {
    /// Forward a new code only after it has been the sole candidate for the delay
    Trailing,
    /// Forward immediately, suppress the same code for the window
    Window,
}

impl DebouncePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebouncePolicy::Trailing => "trailing",
            DebouncePolicy::Window => "window",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique kiosk identifier (e.g., "front-desk")
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "kiosk".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout. Unset means the HTTP client default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self { base_url: default_base_url(), timeout_ms: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scanner_source")]
    pub source: ScannerSource,
    #[serde(default = "default_scanner_device")]
    pub device: String,
    #[serde(default = "default_scanner_baud")]
    pub baud: u32,
    #[serde(default = "default_facing_mode")]
    pub facing_mode: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_qrbox")]
    pub qrbox_width: u32,
    #[serde(default = "default_qrbox")]
    pub qrbox_height: u32,
}

fn default_scanner_source() -> ScannerSource {
    ScannerSource::Stdin
}

fn default_scanner_device() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_scanner_baud() -> u32 {
    9600
}

fn default_facing_mode() -> String {
    "environment".to_string()
}

fn default_fps() -> u32 {
    10
}

fn default_qrbox() -> u32 {
    250
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            source: default_scanner_source(),
            device: default_scanner_device(),
            baud: default_scanner_baud(),
            facing_mode: default_facing_mode(),
            fps: default_fps(),
            qrbox_width: default_qrbox(),
            qrbox_height: default_qrbox(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DebounceConfig {
    #[serde(default = "default_debounce_policy")]
    pub policy: DebouncePolicy,
    #[serde(default = "default_trailing_delay_ms")]
    pub trailing_delay_ms: u64,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_debounce_policy() -> DebouncePolicy {
    DebouncePolicy::Window
}

fn default_trailing_delay_ms() -> u64 {
    2000
}

fn default_window_ms() -> u64 {
    5000
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            policy: default_debounce_policy(),
            trailing_delay_ms: default_trailing_delay_ms(),
            window_ms: default_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// How long a result stays on screen
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

fn default_dwell_ms() -> u64 {
    5000
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { dwell_ms: default_dwell_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Refuse to forward scans until a session is chosen
    #[serde(default = "default_session_required")]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

fn default_session_required() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { required: default_session_required(), options: Vec::new(), default: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
}

fn default_sync_enabled() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { enabled: default_sync_enabled() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    backend_url: String,
    backend_timeout_ms: Option<u64>,
    scanner_source: ScannerSource,
    scanner_device: String,
    scanner_baud: u32,
    scan_settings: ScanSettings,
    debounce_policy: DebouncePolicy,
    trailing_delay_ms: u64,
    window_ms: u64,
    dwell_ms: u64,
    session_required: bool,
    session_options: Vec<String>,
    default_session: Option<String>,
    sync_enabled: bool,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        // Defaults always validate
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    /// Config file path from `CONFIG_FILE`, or the default location.
    /// An explicit `--config` is handled by the binaries' clap args.
    pub fn resolve_config_path() -> String {
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/kiosk.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, path.display().to_string())
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str, source: String) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("invalid TOML")?;
        let config = Self::from_toml(toml_config, source);
        config.validate()?;
        Ok(config)
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let scanner = toml_config.scanner;
        Self {
            site_id: toml_config.site.id,
            backend_url: toml_config.backend.base_url.trim_end_matches('/').to_string(),
            backend_timeout_ms: toml_config.backend.timeout_ms,
            scanner_source: scanner.source,
            scanner_device: scanner.device,
            scanner_baud: scanner.baud,
            scan_settings: ScanSettings {
                facing_mode: scanner.facing_mode,
                fps: scanner.fps,
                qrbox_width: scanner.qrbox_width,
                qrbox_height: scanner.qrbox_height,
            },
            debounce_policy: toml_config.debounce.policy,
            trailing_delay_ms: toml_config.debounce.trailing_delay_ms,
            window_ms: toml_config.debounce.window_ms,
            dwell_ms: toml_config.display.dwell_ms,
            session_required: toml_config.session.required,
            session_options: toml_config.session.options,
            default_session: toml_config.session.default,
            sync_enabled: toml_config.sync.enabled,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.trailing_delay_ms == 0 || self.window_ms == 0 {
            bail!("debounce durations must be positive");
        }
        if self.dwell_ms == 0 {
            bail!("display.dwell_ms must be positive");
        }
        if self.metrics_interval_secs == 0 {
            bail!("metrics.interval_secs must be positive");
        }
        if let Some(default) = &self.default_session {
            if !self.is_known_session(default) {
                bail!("session.default {:?} is not one of session.options", default);
            }
        }
        Ok(())
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// A session name is acceptable if no option list is configured or it is listed
    pub fn is_known_session(&self, name: &str) -> bool {
        self.session_options.is_empty() || self.session_options.iter().any(|s| s == name)
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn backend_timeout(&self) -> Option<Duration> {
        self.backend_timeout_ms.map(Duration::from_millis)
    }

    pub fn scanner_source(&self) -> ScannerSource {
        self.scanner_source
    }

    pub fn scanner_device(&self) -> &str {
        &self.scanner_device
    }

    pub fn scanner_baud(&self) -> u32 {
        self.scanner_baud
    }

    pub fn scan_settings(&self) -> &ScanSettings {
        &self.scan_settings
    }

    pub fn debounce_policy(&self) -> DebouncePolicy {
        self.debounce_policy
    }

    pub fn trailing_delay(&self) -> Duration {
        Duration::from_millis(self.trailing_delay_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn session_required(&self) -> bool {
        self.session_required
    }

    pub fn session_options(&self) -> &[String] {
        &self.session_options
    }

    pub fn default_session(&self) -> Option<&str> {
        self.default_session.as_deref()
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to override the backend URL (tests, CLI flags)
    pub fn with_backend_url(mut self, url: &str) -> Self {
        self.backend_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Builder method to select a debounce policy
    pub fn with_debounce_policy(mut self, policy: DebouncePolicy) -> Self {
        self.debounce_policy = policy;
        self
    }

    /// Builder method for session requirements
    pub fn with_sessions(mut self, required: bool, options: &[&str]) -> Self {
        self.session_required = required;
        self.session_options = options.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "kiosk");
        assert_eq!(config.backend_url(), "http://localhost:5000");
        assert_eq!(config.backend_timeout(), None);
        assert_eq!(config.scanner_source(), ScannerSource::Stdin);
        assert_eq!(config.debounce_policy(), DebouncePolicy::Window);
        assert_eq!(config.trailing_delay(), Duration::from_millis(2000));
        assert_eq!(config.window(), Duration::from_millis(5000));
        assert_eq!(config.dwell(), Duration::from_millis(5000));
        assert!(config.session_required());
        assert_eq!(config.scan_settings().fps, 10);
        assert_eq!(config.prometheus_port(), 0);
    }

    #[test]
    fn test_resolve_config_path_env_or_default() {
        let expected = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/kiosk.toml".to_string());
        assert_eq!(Config::resolve_config_path(), expected);
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let config = Config::from_toml_str(
            "[backend]\nbase_url = \"http://kiosk.local:8080/\"\n",
            "inline".to_string(),
        )
        .unwrap();
        assert_eq!(config.backend_url(), "http://kiosk.local:8080");
    }

    #[test]
    fn test_unknown_default_session_rejected() {
        let toml = r#"
[session]
options = ["Adults", "Kids"]
default = "Seniors"
"#;
        assert!(Config::from_toml_str(toml, "inline".to_string()).is_err());
    }

    #[test]
    fn test_zero_dwell_rejected() {
        assert!(Config::from_toml_str("[display]\ndwell_ms = 0\n", "inline".to_string()).is_err());
    }

    #[test]
    fn test_is_known_session() {
        let open = Config::default();
        assert!(open.is_known_session("anything"));

        let listed = Config::default().with_sessions(true, &["Adults", "Kids"]);
        assert!(listed.is_known_session("Kids"));
        assert!(!listed.is_known_session("Seniors"));
    }
}
