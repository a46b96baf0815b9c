//! Incremental parser for the gateway push stream (server-sent events).
//!
//! Bytes arrive in arbitrary chunks; complete frames are returned as soon as
//! their terminating blank line has been seen. Lines are decoded only once
//! complete, so a character split across chunks survives.

use std::time::Duration;

/// One dispatched push-stream frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Event name; `None` means the default `message`.
    pub event: Option<String>,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Reconnect hint carried by this frame.
    pub retry: Option<Duration>,
}

impl SseFrame {
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    pending: SseFrame,
    has_data: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame it completes.
    ///
    /// Frames with neither data nor a retry hint (keep-alive comments) are
    /// not returned.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                let frame = std::mem::take(&mut self.pending);
                if self.has_data || frame.retry.is_some() {
                    frames.push(frame);
                }
                self.has_data = false;
                continue;
            }
            self.field(line);
        }
        frames
    }

    fn field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match name {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.pending.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }
}
