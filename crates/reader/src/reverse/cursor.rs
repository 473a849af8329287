use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

/// Position of a reverse read within its source.
///
/// `position` only moves toward the start of the file. Once it reaches 0 the
/// only data left is the remainder: the file's first physical line, which has
/// no delimiter in front of it.
///
/// The remainder is the partial line carried between chunks. It is kept as
/// the chunks it was read in (earliest first) and joined once, when the
/// delimiter in front of it turns up, so a long line costs one copy.
#[derive(Debug, Default)]
pub struct ReadCursor {
    pub position: u64,
    remainder: VecDeque<Bytes>,
    remainder_len: usize,
}

impl ReadCursor {
    pub fn new(file_size: u64) -> Self {
        Self {
            position: file_size,
            remainder: VecDeque::new(),
            remainder_len: 0,
        }
    }

    pub fn at_start(&self) -> bool {
        self.position == 0
    }

    /// Byte window `[start, start + len)` of the next chunk ending at `position`.
    pub fn next_window(&self, chunk_size: usize) -> (u64, usize) {
        let len = (chunk_size as u64).min(self.position);
        (self.position - len, len as usize)
    }

    /// Move the cursor back to `start` after a chunk was read successfully.
    pub fn retreat_to(&mut self, start: u64) {
        debug_assert!(start <= self.position);
        self.position = start;
    }

    /// Carry delimiter-free bytes that precede the current remainder in the file.
    pub fn carry(&mut self, bytes: Bytes) {
        if !bytes.is_empty() {
            self.remainder_len += bytes.len();
            self.remainder.push_front(bytes);
        }
    }

    /// Bytes carried so far.
    pub fn remainder_len(&self) -> usize {
        self.remainder_len
    }

    /// Complete a line: `head` followed by everything carried. Clears the remainder.
    pub fn take_line(&mut self, head: Bytes) -> Bytes {
        if self.remainder.is_empty() {
            return head;
        }
        if head.is_empty() && self.remainder.len() == 1 {
            self.remainder_len = 0;
            return self.remainder.pop_front().unwrap_or_default();
        }

        let mut line = BytesMut::with_capacity(head.len() + self.remainder_len);
        line.extend_from_slice(&head);
        for chunk in self.remainder.drain(..) {
            line.extend_from_slice(&chunk);
        }
        self.remainder_len = 0;
        line.freeze()
    }

    pub fn take_remainder(&mut self) -> Bytes {
        self.take_line(Bytes::new())
    }

    pub fn clear_remainder(&mut self) {
        self.remainder.clear();
        self.remainder_len = 0;
    }
}
