//! Core IR, traits and error types for the `wasmdis` annotated disassembler.
//!
//! `wasmdis` takes the native code SpiderMonkey produced for a WebAssembly
//! module, together with the segment metadata describing which bytes belong
//! to which function, and writes a readable listing: one header per
//! function, one line per instruction, call targets rewritten as
//! `name + offset` labels and trap padding collapsed into `...`.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::fs;
//! use wasmdis::{
//!     decoder::CapstoneDecoder,
//!     module::ModuleInfo,
//!     report::{ReportEmitter, ReportOptions},
//!     segment::SegmentMap,
//!     Architecture,
//! };
//!
//! let module = ModuleInfo::parse(&fs::read("module.wasm").unwrap()).unwrap();
//! let segments = SegmentMap::from_json(&fs::read_to_string("wasm.segments.json").unwrap())
//!     .unwrap()
//!     .resolve_all(&module.function_names);
//! let code = fs::read("wasm.bin").unwrap();
//!
//! let decoder = CapstoneDecoder::for_architecture(Architecture::X86_64).unwrap();
//! let emitter = ReportEmitter::new(&decoder, &code, &segments, ReportOptions::default())
//!     .with_module(&module);
//!
//! let mut out = Vec::new();
//! emitter.emit(&mut out).unwrap();
//! ```

pub mod collapse;
pub mod compile;
pub mod decoder;
pub mod inputs;
pub mod label;
pub mod module;
pub mod report;
pub mod segment;
pub mod stream;
pub mod symbols;

/// Represents a byte offset into the compiled code buffer
pub type Address = u64;

use std::fmt;

/// Maximum instruction size in bytes
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Address of the instruction
    pub addr: Address,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Instruction mnemonic (e.g., "mov", "call")
    pub mnemonic: String,
    /// Instruction operands as string representation
    pub operands: String,
    /// The operand value when the instruction has exactly one operand
    /// and the decoder classified it as an immediate
    pub immediate: Option<i64>,
}

impl Insn {
    /// Address of the first byte after this instruction.
    pub fn end(&self) -> Address {
        self.addr + self.size as Address
    }
}

/// Decoder trait: the architecture-specific decode primitive.
///
/// Implementations know nothing about function boundaries. They decode
/// from the start of `window` until they hit `max` instructions, run out
/// of bytes, or meet something they cannot decode.
pub trait Decoder {
    /// Decode up to `max` instructions from `window`.
    ///
    /// # Arguments
    /// * `window` - Bytes to decode, starting with the first instruction
    /// * `base` - Address of `window[0]`
    /// * `max` - Maximum number of instructions to return
    fn decode(
        &self,
        window: &[u8],
        base: Address,
        max: usize,
    ) -> Result<Vec<Insn>, decoder::DecoderError>;
}

/// Supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
#[non_exhaustive]
pub enum Architecture {
    /// 32-bit x86
    #[value(name = "x86-32")]
    X86_32,
    /// 64-bit x86
    #[default]
    #[value(name = "x86-64")]
    X86_64,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86_32 => write!(f, "x86-32"),
            Architecture::X86_64 => write!(f, "x86-64"),
        }
    }
}

/// Errors raised while preparing and loading the inputs of a run
#[derive(Debug, thiserror::Error)]
pub enum DisassemblyError {
    /// An input file is missing or unreadable
    #[error("{0}")]
    Input(#[from] inputs::InputError),

    /// Segment metadata could not be loaded
    #[error("Invalid segment metadata: {0}")]
    Segments(#[from] segment::SegmentError),

    /// The WebAssembly module could not be parsed
    #[error("Failed to parse module: {0}")]
    Module(#[from] module::ModuleError),

    /// Compiling the module to native code failed
    #[error("Compilation failed: {0}")]
    Compile(#[from] compile::CompileError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insn_end() {
        let insn = Insn {
            addr: 0x1000,
            size: 5,
            mnemonic: "call".to_string(),
            operands: "0x2000".to_string(),
            immediate: Some(0x2000),
        };

        assert_eq!(insn.end(), 0x1005);
    }

    #[test]
    fn test_input_errors_convert() {
        let err: DisassemblyError = inputs::InputError::Missing {
            what: "binary",
            path: "out/wasm.bin".into(),
        }
        .into();
        assert!(matches!(err, DisassemblyError::Input(_)));
        assert_eq!(err.to_string(), "binary not found: out/wasm.bin");

        let err: DisassemblyError = segment::SegmentError::OrphanBody { index: 3 }.into();
        assert_eq!(
            err.to_string(),
            "Invalid segment metadata: segment 3: body range without a function index"
        );
    }

    #[test]
    fn test_architecture_display() {
        assert_eq!(Architecture::X86_64.to_string(), "x86-64");
        assert_eq!(Architecture::X86_32.to_string(), "x86-32");
        assert_eq!(Architecture::default(), Architecture::X86_64);
    }
}
