//! Collapsing of trap padding.
//!
//! The compiler fills the gaps between functions and unreachable tails with
//! trap instructions. They carry no information, so a run of them is shown
//! as a single elision line.

use crate::Insn;

/// Mnemonic SpiderMonkey uses for x86 padding
pub const DEFAULT_DEAD_MNEMONIC: &str = "hlt";

/// Line written in place of a run of dead instructions
pub const ELISION_MARKER: &str = "...";

/// What to do with one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collapsed {
    /// Print the instruction
    Emit,
    /// First of a dead run: print the elision marker instead
    Elide,
    /// Later member of a dead run: print nothing
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    InCode,
    InDeadRun,
}

/// Two-state filter over one function's instructions.
#[derive(Debug, Clone)]
pub struct DeadCodeCollapser<'a> {
    dead_mnemonic: &'a str,
    state: State,
}

impl<'a> DeadCodeCollapser<'a> {
    pub fn new(dead_mnemonic: &'a str) -> Self {
        Self {
            dead_mnemonic,
            state: State::InCode,
        }
    }

    pub fn feed(&mut self, insn: &Insn) -> Collapsed {
        if insn.mnemonic != self.dead_mnemonic {
            self.state = State::InCode;
            return Collapsed::Emit;
        }

        match std::mem::replace(&mut self.state, State::InDeadRun) {
            State::InCode => Collapsed::Elide,
            State::InDeadRun => Collapsed::Suppress,
        }
    }
}

impl Default for DeadCodeCollapser<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_MNEMONIC)
    }
}
