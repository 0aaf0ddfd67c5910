//! Chunk processing progress reporting.
//!
//! Reports observable progress during `bh continue` (and the bootstrap batch
//! of `bh full`) so users see which chunk is being analysed, how many are
//! left, and when a chunk is being retried. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event from the chunk processor.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A batch is starting; `processed` chunks were already done.
    BatchStarted {
        bundle_id: String,
        processed: u32,
        total: u32,
        batch: u32,
    },
    /// A chunk committed.
    ChunkCompleted {
        bundle_id: String,
        chunk_index: u32,
        processed: u32,
        total: u32,
    },
    /// A transient failure; the chunk will be tried again after `delay_ms`.
    Retrying {
        bundle_id: String,
        chunk_index: u32,
        attempt: u32,
        delay_ms: u64,
        message: String,
    },
    /// A chunk exhausted its attempts; the batch stops here.
    ChunkFailed {
        bundle_id: String,
        chunk_index: u32,
        attempts: u32,
        message: String,
    },
    /// Another caller holds the processing lease; nothing was done.
    Busy { bundle_id: String },
}

/// Reports processing progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "bundle 1a2b…  chunk 3  done  3 / 12 chunks".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::BatchStarted {
                bundle_id,
                processed,
                total,
                batch,
            } => format!(
                "bundle {}  starting  {} / {} chunks  (batch of {})\n",
                short_id(bundle_id),
                format_number(*processed),
                format_number(*total),
                batch
            ),
            ProgressEvent::ChunkCompleted {
                bundle_id,
                chunk_index,
                processed,
                total,
            } => format!(
                "bundle {}  chunk {}  done  {} / {} chunks\n",
                short_id(bundle_id),
                chunk_index,
                format_number(*processed),
                format_number(*total)
            ),
            ProgressEvent::Retrying {
                bundle_id,
                chunk_index,
                attempt,
                delay_ms,
                message,
            } => format!(
                "bundle {}  chunk {}  attempt {} failed, retrying in {}ms: {}\n",
                short_id(bundle_id),
                chunk_index,
                attempt,
                delay_ms,
                message
            ),
            ProgressEvent::ChunkFailed {
                bundle_id,
                chunk_index,
                attempts,
                message,
            } => format!(
                "bundle {}  chunk {}  failed after {} attempt(s): {}\n",
                short_id(bundle_id),
                chunk_index,
                attempts,
                message
            ),
            ProgressEvent::Busy { bundle_id } => format!(
                "bundle {}  busy  another caller is processing it\n",
                short_id(bundle_id)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::BatchStarted {
                bundle_id,
                processed,
                total,
                batch,
            } => serde_json::json!({
                "event": "progress",
                "bundleId": bundle_id,
                "phase": "started",
                "processed": processed,
                "total": total,
                "batch": batch
            }),
            ProgressEvent::ChunkCompleted {
                bundle_id,
                chunk_index,
                processed,
                total,
            } => serde_json::json!({
                "event": "progress",
                "bundleId": bundle_id,
                "phase": "chunk_completed",
                "chunkIndex": chunk_index,
                "processed": processed,
                "total": total
            }),
            ProgressEvent::Retrying {
                bundle_id,
                chunk_index,
                attempt,
                delay_ms,
                message,
            } => serde_json::json!({
                "event": "progress",
                "bundleId": bundle_id,
                "phase": "retrying",
                "chunkIndex": chunk_index,
                "attempt": attempt,
                "delayMs": delay_ms,
                "message": message
            }),
            ProgressEvent::ChunkFailed {
                bundle_id,
                chunk_index,
                attempts,
                message,
            } => serde_json::json!({
                "event": "progress",
                "bundleId": bundle_id,
                "phase": "chunk_failed",
                "chunkIndex": chunk_index,
                "attempts": attempts,
                "message": message
            }),
            ProgressEvent::Busy { bundle_id } => serde_json::json!({
                "event": "progress",
                "bundleId": bundle_id,
                "phase": "busy"
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn format_number(n: u32) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: '{}'. Must be human, json, or off.", other),
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn short_id_tolerates_short_input() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789"), "01234567");
    }

    #[test]
    fn parses_modes() {
        assert_eq!(ProgressMode::parse("json").unwrap(), ProgressMode::Json);
        assert!(ProgressMode::parse("loud").is_err());
    }
}
