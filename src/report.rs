//! Annotated disassembly report.
//!
//! For every function segment, in segment file order:
//!
//! ```text
//! // add#2 @ 00000100
//! //    native size 32 byte(s)
//! //    wasm size 4 byte(s)
//! 00000100  push rbp
//! 00000101  call 0x00000140 (helper + 0x0000)
//! ...
//! // end of add @ 00000120
//! ```

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use regex::{Regex, RegexBuilder};

use crate::collapse::{Collapsed, DeadCodeCollapser, DEFAULT_DEAD_MNEMONIC, ELISION_MARKER};
use crate::label::LabelRewriter;
use crate::module::ModuleInfo;
use crate::segment::{BodyRange, Segment, SegmentMap};
use crate::stream::{Chunking, InstructionStream};
use crate::{symbols, Address, Decoder, Insn};

/// Errors that abort report generation
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// The function name filter is not a valid regular expression
    #[error("invalid function name filter: {0}")]
    InvalidFilter(#[from] regex::Error),

    /// A function body reaches past the end of the code buffer
    #[error("body of {name} (0x{begin:08X}..0x{end:08X}) lies outside the {len}-byte code buffer")]
    BodyOutOfBounds {
        name: String,
        begin: Address,
        end: Address,
        len: usize,
    },

    /// Writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tunables for report generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    /// Mnemonic treated as padding
    pub dead_mnemonic: String,
    /// Line written for each run of padding
    pub elision_marker: String,
    /// Decoder window and per-window instruction count
    pub chunking: Chunking,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            dead_mnemonic: DEFAULT_DEAD_MNEMONIC.to_string(),
            elision_marker: ELISION_MARKER.to_string(),
            chunking: Chunking::default(),
        }
    }
}

/// Case-insensitive regex matched against resolved function names.
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Regex,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, ReportError> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex })
    }

    /// Unanchored search, so plain text behaves as a substring match.
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Position of the emitter within the segment list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Index of the segment about to be processed
    pub index: usize,
    /// Number of segments in the map
    pub total: usize,
}

/// Totals for one report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Functions written to the report
    pub functions: usize,
    /// Function segments rejected by the name filter
    pub skipped: usize,
    /// Instruction lines written
    pub instructions: usize,
    /// Elision lines written
    pub elisions: usize,
}

/// Writes the annotated listing for a segment map.
pub struct ReportEmitter<'a, D: Decoder + ?Sized> {
    decoder: &'a D,
    code: &'a [u8],
    segments: &'a SegmentMap,
    module: Option<&'a ModuleInfo>,
    filter: Option<NameFilter>,
    options: ReportOptions,
}

impl<'a, D: Decoder + ?Sized> ReportEmitter<'a, D> {
    /// `segments` should already have gone through [`SegmentMap::resolve_all`].
    pub fn new(
        decoder: &'a D,
        code: &'a [u8],
        segments: &'a SegmentMap,
        options: ReportOptions,
    ) -> Self {
        Self {
            decoder,
            code,
            segments,
            module: None,
            filter: None,
            options,
        }
    }

    /// Add wasm body size and locals to each function header.
    pub fn with_module(mut self, module: &'a ModuleInfo) -> Self {
        self.module = Some(module);
        self
    }

    /// Only report functions whose name matches `filter`.
    pub fn with_filter(mut self, filter: NameFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Write the report to a new file at `path`.
    pub fn write_to(&self, path: &Path) -> Result<ReportSummary, ReportError> {
        let mut out = BufWriter::new(File::create(path)?);
        let summary = self.emit(&mut out)?;
        out.flush()?;
        Ok(summary)
    }

    pub fn emit<W: Write>(&self, out: &mut W) -> Result<ReportSummary, ReportError> {
        self.emit_with_progress(out, |_| {})
    }

    /// Write the report, calling `progress` before each function segment.
    pub fn emit_with_progress<W, F>(
        &self,
        out: &mut W,
        mut progress: F,
    ) -> Result<ReportSummary, ReportError>
    where
        W: Write,
        F: FnMut(Progress),
    {
        self.check_bounds()?;

        let total = self.segments.len();
        let mut summary = ReportSummary::default();

        for (index, segment) in self.segments.iter().enumerate() {
            let Some((function_index, body)) = segment.function() else {
                continue;
            };
            progress(Progress { index, total });

            let name = display_name(segment, function_index);
            if !self.selects(&name) {
                log::debug!("skipping {} (filtered)", name);
                summary.skipped += 1;
                continue;
            }

            self.emit_function(out, &name, function_index, body, &mut summary)?;
            summary.functions += 1;
        }

        log::info!(
            "wrote {} functions, {} instructions ({} filtered out)",
            summary.functions,
            summary.instructions,
            summary.skipped
        );
        Ok(summary)
    }

    fn selects(&self, name: &str) -> bool {
        match &self.filter {
            Some(filter) => filter.is_match(name),
            None => true,
        }
    }

    /// Every body that will be reported must lie inside the code buffer
    /// before anything is written. Filtered-out functions are not checked.
    fn check_bounds(&self) -> Result<(), ReportError> {
        for segment in self.segments.functions() {
            let Some((function_index, body)) = segment.function() else {
                continue;
            };
            if body.end <= self.code.len() as u64 {
                continue;
            }
            let name = display_name(segment, function_index);
            if self.selects(&name) {
                return Err(ReportError::BodyOutOfBounds {
                    name: name.into_owned(),
                    begin: body.begin,
                    end: body.end,
                    len: self.code.len(),
                });
            }
        }
        Ok(())
    }

    fn emit_function<W: Write>(
        &self,
        out: &mut W,
        name: &str,
        function_index: u32,
        body: BodyRange,
        summary: &mut ReportSummary,
    ) -> Result<(), ReportError> {
        writeln!(out, "// {}#{} @ {:08X}", name, function_index, body.begin)?;
        writeln!(out, "//    native size {} byte(s)", body.len())?;
        self.emit_wasm_metadata(out, name, function_index)?;

        let labels = LabelRewriter::new(self.segments);
        let mut collapser = DeadCodeCollapser::new(&self.options.dead_mnemonic);
        let stream = InstructionStream::with_chunking(
            self.decoder,
            self.code,
            body.begin,
            body.end,
            self.options.chunking,
        );

        for insn in stream {
            match collapser.feed(&insn) {
                Collapsed::Emit => {
                    writeln!(out, "{}", format_line(&insn, &labels))?;
                    summary.instructions += 1;
                }
                Collapsed::Elide => {
                    writeln!(out, "{}", self.options.elision_marker)?;
                    summary.elisions += 1;
                }
                Collapsed::Suppress => {}
            }
        }

        writeln!(out, "// end of {} @ {:08X}", name, body.end)?;
        writeln!(out)?;
        Ok(())
    }

    fn emit_wasm_metadata<W: Write>(
        &self,
        out: &mut W,
        name: &str,
        function_index: u32,
    ) -> Result<(), ReportError> {
        let Some(module) = self.module else {
            return Ok(());
        };
        let Some(wasm_body) = module.body_for(function_index) else {
            log::debug!(
                "{}#{}: no code body (import count {})",
                name,
                function_index,
                module.import_count
            );
            return Ok(());
        };

        writeln!(out, "//    wasm size {} byte(s)", wasm_body.body_size)?;
        if !wasm_body.locals.is_empty() {
            writeln!(out, "//    wasm locals:")?;
            for local in &wasm_body.locals {
                writeln!(out, "//      {}", local)?;
            }
        }
        Ok(())
    }
}

fn display_name(segment: &Segment, function_index: u32) -> Cow<'_, str> {
    match segment.name.as_deref() {
        Some(name) if !name.is_empty() => Cow::Borrowed(name),
        _ => Cow::Owned(symbols::synthetic_name(function_index)),
    }
}

/// `ADDRESS  mnemonic operand`, with a lone immediate operand labelled.
fn format_line(insn: &Insn, labels: &LabelRewriter<'_>) -> String {
    let operand = match insn.immediate {
        Some(imm) => Cow::Owned(labels.rewrite(imm)),
        None => Cow::Borrowed(insn.operands.as_str()),
    };

    if operand.is_empty() {
        format!("{:08X}  {}", insn.addr, insn.mnemonic)
    } else {
        format!("{:08X}  {} {}", insn.addr, insn.mnemonic, operand)
    }
}
