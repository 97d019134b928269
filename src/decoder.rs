//! Capstone-based instruction decoders for the x86 family.

use std::fmt;

use capstone::arch::x86::{ArchMode as X86Mode, ArchSyntax as X86Syntax, X86OperandType};
use capstone::arch::ArchOperand;
use capstone::prelude::*;

use crate::{Address, Architecture, Decoder, Insn};

/// Errors that can occur during decoding
#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// Capstone error
    #[error("Capstone error: {0}")]
    CapstoneError(#[from] capstone::Error),

    /// Unsupported architecture
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(Architecture),
}

/// A Capstone-based decoder producing Intel syntax with operand details.
pub enum CapstoneDecoder {
    X86_32(Capstone),
    X86_64(Capstone),
}

impl CapstoneDecoder {
    /// Create a decoder for a specific architecture
    pub fn for_architecture(arch: Architecture) -> Result<Self, DecoderError> {
        match arch {
            Architecture::X86_32 => Ok(CapstoneDecoder::X86_32(Self::build_x86(X86Mode::Mode32)?)),
            Architecture::X86_64 => Ok(CapstoneDecoder::X86_64(Self::build_x86(X86Mode::Mode64)?)),
            #[allow(unreachable_patterns)]
            other => Err(DecoderError::UnsupportedArchitecture(other)),
        }
    }

    /// Build an x86 decoder in the given mode.
    ///
    /// Details stay enabled: they are the only way to tell an immediate
    /// call target apart from a register or memory operand.
    fn build_x86(mode: X86Mode) -> Result<Capstone, DecoderError> {
        Ok(Capstone::new()
            .x86()
            .mode(mode)
            .syntax(X86Syntax::Intel)
            .detail(true)
            .build()?)
    }

    /// Get the architecture of this decoder
    pub fn architecture(&self) -> Architecture {
        match self {
            CapstoneDecoder::X86_32(_) => Architecture::X86_32,
            CapstoneDecoder::X86_64(_) => Architecture::X86_64,
        }
    }

    fn handle(&self) -> &Capstone {
        match self {
            CapstoneDecoder::X86_32(cs) | CapstoneDecoder::X86_64(cs) => cs,
        }
    }
}

impl fmt::Debug for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapstoneDecoder::{}", self.architecture())
    }
}

/// Returns the immediate value when `operands` is exactly one x86 immediate.
fn single_immediate(operands: &[ArchOperand]) -> Option<i64> {
    match operands {
        [ArchOperand::X86Operand(op)] => match op.op_type {
            X86OperandType::Imm(imm) => Some(imm),
            _ => None,
        },
        _ => None,
    }
}

impl Decoder for CapstoneDecoder {
    fn decode(&self, window: &[u8], base: Address, max: usize) -> Result<Vec<Insn>, DecoderError> {
        // capstone treats a count of zero as "no limit"
        if max == 0 || window.is_empty() {
            return Ok(Vec::new());
        }

        let cs = self.handle();
        let insns = cs.disasm_count(window, base, max)?;

        let mut result = Vec::with_capacity(insns.len());
        for i in insns.iter() {
            let immediate = match cs.insn_detail(i) {
                Ok(detail) => single_immediate(&detail.arch_detail().operands()),
                Err(e) => {
                    log::debug!("no operand details at 0x{:x}: {}", i.address(), e);
                    None
                }
            };

            result.push(Insn {
                addr: i.address(),
                size: i.bytes().len() as u8,
                mnemonic: i.mnemonic().unwrap_or("").to_string(),
                operands: i.op_str().unwrap_or("").to_string(),
                immediate,
            });
        }

        Ok(result)
    }
}
