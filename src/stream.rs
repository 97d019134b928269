//! Boundary-clipped instruction stream over one function body.
//!
//! The decode primitive works on fixed-size byte windows and knows nothing
//! about where a function ends. This stream feeds it one window at a time,
//! re-anchoring each window right after the last whole instruction, and
//! stops the moment an instruction would reach past the body end.

use std::collections::VecDeque;

use crate::{Address, Decoder, Insn, MAX_INSTRUCTION_SIZE};

/// Default window size handed to the decoder per call
pub const CHUNK_SIZE: usize = 256;

/// How much the stream asks of the decoder per call.
///
/// `capacity * MAX_INSTRUCTION_SIZE` should not exceed `window`, otherwise
/// a window can run out of bytes before `capacity` instructions and the
/// stream will take that for the decoder giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunking {
    /// Bytes per window
    pub window: usize,
    /// Instructions requested per window
    pub capacity: usize,
}

impl Default for Chunking {
    fn default() -> Self {
        Self {
            window: CHUNK_SIZE,
            capacity: CHUNK_SIZE / MAX_INSTRUCTION_SIZE,
        }
    }
}

/// Lazy, address-ordered instructions covering exactly `[begin, end)`.
pub struct InstructionStream<'a, D: Decoder + ?Sized> {
    decoder: &'a D,
    buffer: &'a [u8],
    cursor: Address,
    end: Address,
    chunking: Chunking,
    pending: VecDeque<Insn>,
    /// Set once no further chunk may be requested
    exhausted: bool,
    /// Set once an instruction crossed `end`; nothing more is yielded
    done: bool,
}

impl<'a, D: Decoder + ?Sized> InstructionStream<'a, D> {
    pub fn new(decoder: &'a D, buffer: &'a [u8], begin: Address, end: Address) -> Self {
        Self::with_chunking(decoder, buffer, begin, end, Chunking::default())
    }

    pub fn with_chunking(
        decoder: &'a D,
        buffer: &'a [u8],
        begin: Address,
        end: Address,
        chunking: Chunking,
    ) -> Self {
        Self {
            decoder,
            buffer,
            cursor: begin,
            end,
            chunking: Chunking {
                window: chunking.window.max(1),
                capacity: chunking.capacity.max(1),
            },
            pending: VecDeque::new(),
            exhausted: begin >= end,
            done: false,
        }
    }

    /// Decode the next window into `pending`.
    fn refill(&mut self) {
        let start = self.cursor as usize;
        if start >= self.buffer.len() {
            self.exhausted = true;
            return;
        }
        let stop = start.saturating_add(self.chunking.window).min(self.buffer.len());

        let window = &self.buffer[start..stop];
        let insns = match self.decoder.decode(window, self.cursor, self.chunking.capacity) {
            Ok(insns) => insns,
            Err(e) => {
                log::warn!("decoding stopped at 0x{:08X}: {}", self.cursor, e);
                self.exhausted = true;
                return;
            }
        };

        match insns.last() {
            Some(last) if insns.len() >= self.chunking.capacity && last.end() > self.cursor => {
                self.cursor = last.end();
            }
            _ => self.exhausted = true,
        }
        self.pending.extend(insns);
    }
}

impl<D: Decoder + ?Sized> Iterator for InstructionStream<'_, D> {
    type Item = Insn;

    fn next(&mut self) -> Option<Insn> {
        if self.done {
            return None;
        }

        while self.pending.is_empty() {
            if self.exhausted {
                self.done = true;
                return None;
            }
            self.refill();
        }

        let insn = self.pending.pop_front()?;
        if insn.addr >= self.end || insn.end() > self.end {
            self.done = true;
            self.pending.clear();
            return None;
        }
        Some(insn)
    }
}
