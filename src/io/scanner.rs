//! Decoder sources - where decoded scan text comes from
//!
//! Every source reports through the same channel:
//! - `Started` once the device is live
//! - `Decoded` per successful read, `Failed` per garbled/empty read
//! - `Unavailable` once if the device cannot be acquired (no retry)
//!
//! Sources:
//! - `StdinScanner` - keyboard-wedge scanners and manual entry, one code per line
//! - `SerialScanner` - line-terminated scanners on a serial port
//! - `ChannelScanner` - in-process feed (terminal UI, tests)

use crate::domain::types::{DecoderEvent, ScanError, ScanEvent, ScanSettings};
use crate::infra::config::{Config, ScannerSource};
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, trace, warn};

/// Longest line accepted from a serial scanner before the buffer is discarded
const MAX_LINE_LEN: usize = 4096;

/// Capability interface for anything that yields decoded scans
#[async_trait]
pub trait DecoderSource: Send {
    fn name(&self) -> &'static str;

    /// Run until shutdown, the input ends, or the receiver goes away
    async fn start(
        self: Box<Self>,
        settings: ScanSettings,
        tx: mpsc::Sender<DecoderEvent>,
        shutdown: watch::Receiver<bool>,
    );
}

/// Build the source selected in config
pub fn from_config(config: &Config) -> Box<dyn DecoderSource> {
    match config.scanner_source() {
        ScannerSource::Stdin => Box::new(StdinScanner),
        ScannerSource::Serial => {
            Box::new(SerialScanner::new(config.scanner_device(), config.scanner_baud()))
        }
    }
}

/// Turn one raw line into a decoder event
pub fn classify_line(line: &str) -> DecoderEvent {
    let text = line.trim();
    if text.is_empty() {
        DecoderEvent::Failed(ScanError { reason: "empty read".to_string() })
    } else {
        DecoderEvent::Decoded(ScanEvent::new(text))
    }
}

fn log_started(source: &str, settings: &ScanSettings) {
    info!(
        source = %source,
        facing_mode = %settings.facing_mode,
        fps = %settings.fps,
        qrbox_width = %settings.qrbox_width,
        qrbox_height = %settings.qrbox_height,
        "scanner_started"
    );
}

/// Returns false once the coordinator is gone
async fn emit(tx: &mpsc::Sender<DecoderEvent>, event: DecoderEvent) -> bool {
    if let DecoderEvent::Failed(ref e) = event {
        trace!(reason = %e.reason, "scan_decode_failed");
    }
    tx.send(event).await.is_ok()
}

pub struct StdinScanner;

#[async_trait]
impl DecoderSource for StdinScanner {
    fn name(&self) -> &'static str {
        "stdin"
    }

    async fn start(
        self: Box<Self>,
        settings: ScanSettings,
        tx: mpsc::Sender<DecoderEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        log_started(self.name(), &settings);
        if !emit(&tx, DecoderEvent::Started).await {
            return;
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scanner_shutdown");
                        return;
                    }
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if !emit(&tx, classify_line(&line)).await {
                            return;
                        }
                    }
                    Ok(None) => {
                        info!("scanner_input_closed");
                        return;
                    }
                    Err(e) => {
                        // Non-UTF-8 input; the line is lost but stdin stays usable
                        if !emit(&tx, DecoderEvent::Failed(ScanError { reason: e.to_string() })).await {
                            return;
                        }
                    }
                },
            }
        }
    }
}

pub struct SerialScanner {
    device: String,
    baud: u32,
    /// Bytes carried across reads until a line terminator arrives
    read_buffer: BytesMut,
}

impl SerialScanner {
    pub fn new(device: &str, baud: u32) -> Self {
        Self { device: device.to_string(), baud, read_buffer: BytesMut::with_capacity(256) }
    }

    /// Split complete CR/LF-terminated lines off the buffer.
    ///
    /// Partial data stays buffered for the next read.
    fn drain_lines(&mut self) -> Vec<DecoderEvent> {
        let mut events = Vec::new();
        while let Some(pos) = self.read_buffer.iter().position(|&b| b == b'\n' || b == b'\r') {
            let line = self.read_buffer.split_to(pos);
            self.read_buffer.advance(1);

            // CRLF produces an empty segment; not a read
            if line.is_empty() {
                continue;
            }
            match std::str::from_utf8(&line) {
                Ok(text) => events.push(classify_line(text)),
                Err(_) => events.push(DecoderEvent::Failed(ScanError {
                    reason: format!("invalid utf-8 ({} bytes)", line.len()),
                })),
            }
        }

        if self.read_buffer.len() > MAX_LINE_LEN {
            debug!(discarded = self.read_buffer.len(), "scanner_line_overflow");
            self.read_buffer.clear();
            events.push(DecoderEvent::Failed(ScanError { reason: "line overflow".to_string() }));
        }
        events
    }
}

#[async_trait]
impl DecoderSource for SerialScanner {
    fn name(&self) -> &'static str {
        "serial"
    }

    async fn start(
        mut self: Box<Self>,
        settings: ScanSettings,
        tx: mpsc::Sender<DecoderEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let port_result = tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async();

        let mut port = match port_result {
            Ok(p) => {
                info!(device = %self.device, baud = %self.baud, "scanner_port_opened");
                p
            }
            Err(e) => {
                error!(device = %self.device, error = %e, "scanner_port_open_failed");
                let _ = tx.send(DecoderEvent::Unavailable(format!("{}: {}", self.device, e))).await;
                return;
            }
        };

        log_started(self.name(), &settings);
        if !emit(&tx, DecoderEvent::Started).await {
            return;
        }

        let mut temp_buf = [0u8; 256];
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scanner_shutdown");
                        return;
                    }
                }
                read = port.read(&mut temp_buf) => match read {
                    Ok(0) => {}
                    Ok(n) => {
                        self.read_buffer.extend_from_slice(&temp_buf[..n]);
                        for event in self.drain_lines() {
                            if !emit(&tx, event).await {
                                return;
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        warn!(device = %self.device, error = %e, "scanner_read_error");
                        let _ = tx.send(DecoderEvent::Unavailable(format!("{}: {}", self.device, e))).await;
                        return;
                    }
                },
            }
        }
    }
}

/// Source fed from inside the process
pub struct ChannelScanner {
    rx: mpsc::Receiver<String>,
}

impl ChannelScanner {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Create a sender together with the source it feeds
    pub fn channel(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl DecoderSource for ChannelScanner {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn start(
        mut self: Box<Self>,
        settings: ScanSettings,
        tx: mpsc::Sender<DecoderEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        log_started(self.name(), &settings);
        if !emit(&tx, DecoderEvent::Started).await {
            return;
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                line = self.rx.recv() => match line {
                    Some(line) => {
                        if !emit(&tx, classify_line(&line)).await {
                            return;
                        }
                    }
                    None => return,
                },
            }
        }
    }
}
