//! Bounded buffer for inbound media frames
//!
//! Frames are kept opaque; recognition happens upstream and arrives as text.

use std::collections::VecDeque;

/// Keeps the most recent frames up to `capacity` bytes
#[derive(Debug)]
pub struct AudioBuffer {
    frames: VecDeque<Vec<u8>>,
    bytes: usize,
    capacity: usize,
    dropped_bytes: u64,
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            bytes: 0,
            capacity,
            dropped_bytes: 0,
        }
    }

    /// Append a frame, evicting the oldest frames once over capacity.
    ///
    /// A single frame larger than the whole buffer is dropped outright.
    pub fn push(&mut self, frame: Vec<u8>) {
        if frame.len() > self.capacity {
            self.dropped_bytes += frame.len() as u64;
            return;
        }
        self.bytes += frame.len();
        self.frames.push_back(frame);

        while self.bytes > self.capacity {
            let Some(oldest) = self.frames.pop_front() else {
                break;
            };
            self.bytes -= oldest.len();
            self.dropped_bytes += oldest.len() as u64;
        }
    }

    pub fn len_bytes(&self) -> usize {
        self.bytes
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.bytes = 0;
    }
}
