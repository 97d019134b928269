//! Segment metadata emitted alongside the compiled code.
//!
//! The compiler driver writes a JSON array describing every code range it
//! produced. Function ranges carry a global function index and the byte
//! range of the actual function body; everything else (entry stubs, trap
//! exits, ...) is metadata only.

use std::io::Read;

use serde::Deserialize;

use crate::symbols::{self, FunctionNames};
use crate::Address;

/// Errors raised while loading segment metadata. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// The file is not a JSON array of well-formed segment records
    #[error("malformed segment JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A function record without a complete body range
    #[error("segment {index}: function {func_index} has no complete body range")]
    MissingBody { index: usize, func_index: u32 },

    /// A body range on a record that is not a function
    #[error("segment {index}: body range without a function index")]
    OrphanBody { index: usize },

    /// Only one end of the body range is present
    #[error("segment {index}: body range is missing its {missing} bound")]
    HalfOpenBody { index: usize, missing: &'static str },

    /// A range whose start lies after its end
    #[error("segment {index}: inverted {what} range 0x{begin:x}..0x{end:x}")]
    InvertedRange {
        index: usize,
        what: &'static str,
        begin: Address,
        end: Address,
    },
}

/// One record as it appears in the segments file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRecord {
    pub kind: u32,
    pub begin: Address,
    pub end: Address,
    #[serde(default)]
    pub func_index: Option<u32>,
    #[serde(default)]
    pub func_body_begin: Option<Address>,
    #[serde(default)]
    pub func_body_end: Option<Address>,
}

/// Half-open byte range `[begin, end)` holding a function's instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyRange {
    pub begin: Address,
    pub end: Address,
}

impl BodyRange {
    /// Size of the body in bytes
    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Whether `addr` falls inside the body, counting `end` itself as inside.
    ///
    /// Label lookups use this form so the address just past a function
    /// (a return address after a trailing call) still resolves to it.
    pub fn contains_inclusive(&self, addr: Address) -> bool {
        self.begin <= addr && addr <= self.end
    }
}

/// A described byte range within the compiled code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Producer-specific range kind
    pub kind: u32,
    /// Start of the raw range
    pub begin: Address,
    /// End of the raw range (exclusive)
    pub end: Address,
    /// Global function index, for function ranges
    pub function_index: Option<u32>,
    /// Disassemblable body, for function ranges
    pub body: Option<BodyRange>,
    /// Display name; filled in by [`SegmentMap::resolve_all`]
    pub name: Option<String>,
}

impl Segment {
    /// Validate one record. `index` is its position in the file, for messages.
    fn from_record(index: usize, rec: SegmentRecord) -> Result<Self, SegmentError> {
        if rec.begin > rec.end {
            return Err(SegmentError::InvertedRange {
                index,
                what: "segment",
                begin: rec.begin,
                end: rec.end,
            });
        }

        let body = match (rec.func_body_begin, rec.func_body_end) {
            (Some(begin), Some(end)) => {
                if begin > end {
                    return Err(SegmentError::InvertedRange {
                        index,
                        what: "body",
                        begin,
                        end,
                    });
                }
                Some(BodyRange { begin, end })
            }
            (Some(_), None) => return Err(SegmentError::HalfOpenBody { index, missing: "end" }),
            (None, Some(_)) => return Err(SegmentError::HalfOpenBody { index, missing: "begin" }),
            (None, None) => None,
        };

        match (rec.func_index, body) {
            (Some(func_index), None) => Err(SegmentError::MissingBody { index, func_index }),
            (None, Some(_)) => Err(SegmentError::OrphanBody { index }),
            (function_index, body) => Ok(Segment {
                kind: rec.kind,
                begin: rec.begin,
                end: rec.end,
                function_index,
                body,
                name: None,
            }),
        }
    }

    /// Function index and body, when this segment is a disassemblable function.
    pub fn function(&self) -> Option<(u32, BodyRange)> {
        Some((self.function_index?, self.body?))
    }

    /// Resolved name, or an empty string before resolution.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Ordered collection of segments, in the order the producer wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentMap {
    segments: Vec<Segment>,
}

impl SegmentMap {
    /// Build the map from already-deserialized records.
    pub fn from_records(records: Vec<SegmentRecord>) -> Result<Self, SegmentError> {
        let segments = records
            .into_iter()
            .enumerate()
            .map(|(index, rec)| Segment::from_record(index, rec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Parse the segments file contents.
    pub fn from_json(json: &str) -> Result<Self, SegmentError> {
        Self::from_records(serde_json::from_str(json)?)
    }

    /// Parse the segments file from a reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SegmentError> {
        Self::from_records(serde_json::from_reader(reader)?)
    }

    /// Fill in the display name of every function segment.
    ///
    /// Non-function segments keep `name == None`.
    pub fn resolve_all(self, names: &FunctionNames) -> Self {
        let segments = self
            .segments
            .into_iter()
            .map(|mut seg| {
                if let Some(index) = seg.function_index {
                    seg.name = Some(symbols::resolve(index, names));
                }
                seg
            })
            .collect();
        Self { segments }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments that carry a function body, in file order.
    pub fn functions(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| s.function().is_some())
    }
}

impl<'a> IntoIterator for &'a SegmentMap {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}
