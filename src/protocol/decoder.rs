use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref PROGRESS_LINE: Regex =
        Regex::new(r"^::progress::(\d{1,3})::(.*)$").expect("progress pattern is valid");
}

/// One progress marker decoded from Engine stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Always within 0..=100
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(percent: u32, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100) as u8,
            message: message.into(),
        }
    }

    pub fn fraction(&self) -> f64 {
        f64::from(self.percent) / 100.0
    }
}

/// True when `line` is a protocol marker rather than payload or diagnostics.
pub fn is_progress_line(line: &str) -> bool {
    PROGRESS_LINE.is_match(line.trim_end_matches('\r'))
}

/// Parse a single complete line. Percent values above 100 clamp to 100.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let line = line.trim_end_matches('\r');
    let caps = PROGRESS_LINE.captures(line)?;
    // At most three digits, so this never overflows
    let percent: u32 = caps[1].parse().ok()?;
    Some(ProgressEvent::new(percent, &caps[2]))
}

/// Incremental decoder for chunked stdout.
///
/// Chunks may split lines anywhere, including inside a multi-byte UTF-8
/// sequence; the incomplete tail is carried over until its newline arrives.
/// Each complete line is inspected exactly once.
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    carry: Vec<u8>,
    lines_seen: u64,
}

impl ProgressDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk and return the events completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        let mut start = 0;

        for (idx, byte) in chunk.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            let line = if self.carry.is_empty() {
                String::from_utf8_lossy(&chunk[start..idx]).into_owned()
            } else {
                self.carry.extend_from_slice(&chunk[start..idx]);
                let joined = String::from_utf8_lossy(&self.carry).into_owned();
                self.carry.clear();
                joined
            };
            start = idx + 1;
            self.lines_seen += 1;
            if let Some(event) = parse_progress_line(&line) {
                events.push(event);
            }
        }

        self.carry.extend_from_slice(&chunk[start..]);
        events
    }

    /// Flush the trailing fragment once the stream has closed.
    pub fn finish(&mut self) -> Option<ProgressEvent> {
        if self.carry.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        self.lines_seen += 1;
        parse_progress_line(&line)
    }

    /// Bytes waiting for a newline
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    pub fn lines_seen(&self) -> u64 {
        self.lines_seen
    }

    /// Decode a complete stream in one go.
    pub fn decode_all(bytes: &[u8]) -> Vec<ProgressEvent> {
        let mut decoder = Self::new();
        let mut events = decoder.push(bytes);
        events.extend(decoder.finish());
        events
    }
}
