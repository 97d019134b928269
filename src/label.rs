//! Symbolic labels for immediate operands.

use crate::segment::SegmentMap;
use crate::Address;

/// Rewrites absolute addresses as `name + offset` labels.
///
/// Lookup is a linear scan in file order and the first containing body
/// wins, even when a later segment would be a tighter fit.
#[derive(Debug, Clone, Copy)]
pub struct LabelRewriter<'a> {
    segments: &'a SegmentMap,
}

impl<'a> LabelRewriter<'a> {
    pub fn new(segments: &'a SegmentMap) -> Self {
        Self { segments }
    }

    /// Render `immediate`, labelled when it points into a known function body.
    pub fn rewrite(&self, immediate: i64) -> String {
        let addr = immediate as u64;
        if immediate < 0 {
            return format!("0x{:08X}", addr);
        }

        match self.lookup(addr) {
            Some((name, offset)) => format!("0x{:08X} ({} + 0x{:04X})", addr, name, offset),
            None => format!("0x{:08X}", addr),
        }
    }

    /// Name and offset of the first body containing `addr` (end inclusive).
    pub fn lookup(&self, addr: Address) -> Option<(&'a str, u64)> {
        self.segments.iter().find_map(|seg| {
            let body = seg.body?;
            if body.contains_inclusive(addr) {
                Some((seg.display_name(), addr - body.begin))
            } else {
                None
            }
        })
    }
}
