//! Log sink - Append-only buffer of captured process output

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

/// Where a chunk of log text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    /// Messages written by the launcher itself (launch banners)
    Launcher,
    Stdout,
    Stderr,
}

impl LogSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Launcher => "launcher",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogChunk {
    /// Position in the buffer's lifetime, keeps increasing across clears
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub source: LogSource,
    pub text: String,
}

#[derive(Default)]
struct LogBuffer {
    chunks: Vec<LogChunk>,
    next_seq: u64,
}

/// Shared, unbounded log buffer
///
/// Cloning yields another handle to the same buffer. Arrival order is
/// preserved; nothing else is guaranteed about how chunks split lines.
#[derive(Clone, Default)]
pub struct LogSink {
    inner: Arc<RwLock<LogBuffer>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a launcher-originated message
    pub fn append(&self, text: impl Into<String>) {
        self.append_from(LogSource::Launcher, text);
    }

    pub fn append_from(&self, source: LogSource, text: impl Into<String>) {
        let mut buffer = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let seq = buffer.next_seq;
        buffer.next_seq += 1;
        buffer.chunks.push(LogChunk {
            seq,
            at: Utc::now(),
            source,
            text: text.into(),
        });
    }

    /// Drop everything buffered so far
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .chunks
            .clear();
    }

    pub fn snapshot(&self) -> Vec<LogChunk> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .chunks
            .clone()
    }

    /// Chunks appended at or after `seq`, for incremental readers
    pub fn since(&self, seq: u64) -> Vec<LogChunk> {
        let buffer = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let start = buffer.chunks.partition_point(|c| c.seq < seq);
        buffer.chunks[start..].to_vec()
    }

    /// Sequence number the next appended chunk will get
    pub fn next_seq(&self) -> u64 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).next_seq
    }

    /// Full buffered text, one chunk per line
    #[cfg(test)]
    pub fn text(&self) -> String {
        let buffer = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        for chunk in &buffer.chunks {
            out.push_str(chunk.text.trim_end_matches('\n'));
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).chunks.len()
    }
}
