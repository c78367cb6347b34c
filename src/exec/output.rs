// src/exec/output.rs

//! Captured output handling.

use std::collections::VecDeque;

/// Bounded capture of a process's output stream.
///
/// With a limit of `n` bytes only the first `n / 2` and the last `n - n / 2`
/// bytes are held, however much the process writes. A limit of `0` keeps
/// everything.
#[derive(Debug, Default)]
pub struct OutputCapture {
    limit: usize,
    head: Vec<u8>,
    tail: VecDeque<u8>,
    total: usize,
}

impl OutputCapture {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Bytes written so far, including any that were dropped.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn push(&mut self, mut bytes: &[u8]) {
        self.total += bytes.len();

        let head_cap = if self.limit == 0 { usize::MAX } else { self.limit / 2 };
        if self.head.len() < head_cap {
            let take = bytes.len().min(head_cap - self.head.len());
            self.head.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
        if bytes.is_empty() {
            return;
        }

        let tail_cap = self.limit - self.limit / 2;
        if bytes.len() >= tail_cap {
            self.tail.clear();
            self.tail.extend(&bytes[bytes.len() - tail_cap..]);
        } else {
            self.tail.extend(bytes);
            let excess = self.tail.len().saturating_sub(tail_cap);
            self.tail.drain(..excess);
        }
    }

    /// The captured text, with a marker line where bytes were dropped.
    ///
    /// Invalid UTF-8 is replaced; a character cut by the head or tail
    /// boundary is dropped whole.
    pub fn finish(self) -> String {
        let mut tail: Vec<u8> = self.tail.into();
        let kept = self.head.len() + tail.len();
        if kept == self.total {
            let mut bytes = self.head;
            bytes.append(&mut tail);
            return String::from_utf8_lossy(&bytes).into_owned();
        }

        let head = &self.head[..complete_prefix_len(&self.head)];
        let tail = &tail[leading_continuation_bytes(&tail)..];
        let omitted = self.total - head.len() - tail.len();

        let mut trimmed = String::with_capacity(self.limit + 80);
        trimmed.push_str(&String::from_utf8_lossy(head));
        trimmed.push_str(&format!(
            "\n\n######## output trimmed: {omitted} bytes omitted ########\n\n"
        ));
        trimmed.push_str(&String::from_utf8_lossy(tail));
        trimmed
    }
}

/// Keep at most `max_bytes` of `text`: the head and the tail, joined by a
/// marker line naming how much was dropped. `0` keeps everything.
pub fn trim_output(text: String, max_bytes: usize) -> String {
    if max_bytes == 0 || text.len() <= max_bytes {
        return text;
    }
    let mut capture = OutputCapture::new(max_bytes);
    capture.push(text.as_bytes());
    capture.finish()
}

/// Length of `bytes` without a multi-byte character cut off at the end.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        // Invalid in the middle; leave it to lossy conversion.
        Err(_) => bytes.len(),
    }
}

/// Number of UTF-8 continuation bytes at the start of `bytes` (at most 3).
fn leading_continuation_bytes(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take(3)
        .take_while(|b| (**b & 0b1100_0000) == 0b1000_0000)
        .count()
}
