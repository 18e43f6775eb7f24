//! Bounded terminal output buffer.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::constants::OUTPUT_BUFFER_CAPACITY;

/// Most recent `capacity` characters of terminal output.
///
/// Appending past the capacity drops the oldest characters first. Lengths
/// are counted in `char`s, so multi-byte text is never split.
///
/// Dropped text is only skipped over; the backing string is compacted once
/// the skipped prefix outgrows the live text, so a full buffer costs
/// amortized O(appended) per append.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    data: String,
    /// Byte offset of the first live character.
    start: usize,
    chars: usize,
    capacity: usize,
}

impl OutputBuffer {
    /// Empty buffer holding at most `capacity` characters.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: String::new(),
            start: 0,
            chars: 0,
            capacity,
        }
    }

    /// Append text, truncating from the front to stay within capacity.
    pub fn append(&mut self, text: &str) {
        if self.capacity == 0 || text.is_empty() {
            return;
        }
        let incoming = text.chars().count();
        if incoming >= self.capacity {
            let skip = incoming - self.capacity;
            let start = text.char_indices().nth(skip).map_or(text.len(), |(i, _)| i);
            self.data.clear();
            self.data.push_str(&text[start..]);
            self.start = 0;
            self.chars = self.capacity;
            return;
        }

        self.data.push_str(text);
        self.chars += incoming;
        if self.chars > self.capacity {
            let excess = self.chars - self.capacity;
            let live = &self.data[self.start..];
            let cut = live.char_indices().nth(excess).map_or(live.len(), |(i, _)| i);
            self.start += cut;
            self.chars = self.capacity;
            if self.start > self.data.len() / 2 {
                self.data.drain(..self.start);
                self.start = 0;
            }
        }
    }

    /// Buffered text.
    pub fn as_str(&self) -> &str {
        &self.data[self.start..]
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.chars
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    /// Maximum length in characters.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all buffered text.
    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
        self.chars = 0;
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(OUTPUT_BUFFER_CAPACITY)
    }
}

/// Output buffer shared between the connection task (writer) and observers
/// (readers). Readers only ever get copies.
#[derive(Debug, Clone, Default)]
pub struct SharedOutput(Arc<RwLock<OutputBuffer>>);

impl SharedOutput {
    /// Shared buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(RwLock::new(OutputBuffer::new(capacity))))
    }

    /// Copy of the buffered text.
    pub fn snapshot(&self) -> String {
        self.0.read().as_str().to_string()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub(crate) fn append(&self, text: &str) {
        self.0.write().append(text);
    }

    pub(crate) fn clear(&self) {
        self.0.write().clear();
    }
}
