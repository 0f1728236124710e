use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, StructuralError};
use crate::view::BufView;

/// Number of tables in a data pack.
pub const TABLE_COUNT: usize = 20;

/// Container layouts whose table-index-to-schema mapping differs.
///
/// The composition tables (13..19) shifted meaning between format
/// revisions; every index lookup goes through [`SchemaRegistry::for_shape`]
/// so a new revision is one more registry, not scattered special cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinShape {
    /// Removable card image (archive found by signature scan).
    Card,
    /// Firmware image (fixed absolute regions).
    Firmware,
}

/// Width of one entry in an offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetWidth {
    U16,
    U32,
}

/// Record layout of a fixed-stride table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    ParticleEmitter,
    Item,
    Character,
}

/// Schema family of one table, with the parameters the generic decoders
/// need. Dependencies are data (`deps`), never implied by table order.
#[derive(Debug, Clone, Copy)]
pub enum SchemaKind {
    /// Undocumented contents; words preserved verbatim.
    Raw,
    /// Records of one fixed byte stride.
    FixedStride { stride: usize, record: RecordKind },
    /// Offset list delimiting spans in another table. `scale` converts
    /// stored units to bytes (x2 word offsets, x4 dword offsets).
    OffsetList { width: OffsetWidth, scale: usize },
    /// `{start, len}` group entries; `0xFFFF` start marks padding.
    GroupList,
    /// Null-terminated string records.
    StringRecords,
    /// Word spans delimited by a sibling offset table.
    Spans { offsets: usize },
    /// Spans grouped by a sibling group table (composition groups).
    GroupedSpans { offsets: usize, groups: usize },
    /// Scene layer records addressed through per-scene offset lists.
    LayerRecords { layer_lists: usize },
    /// Animation frame layer records (bitmask-prefixed, sequential).
    FrameRecords,
    /// Frame references folded into fixed-size groups.
    FrameGroups { layers: usize },
    /// Numeric card/build id in the first word, raw tail.
    CardId,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub kind: SchemaKind,
    /// Tables that must decode before this one.
    pub deps: &'static [usize],
}

const fn schema(kind: SchemaKind, deps: &'static [usize]) -> TableSchema {
    TableSchema { kind, deps }
}

/// Per-shape table registry: the decode semantics of each of the 20
/// tables, consulted by one generic dispatch loop.
pub struct SchemaRegistry {
    tables: [TableSchema; TABLE_COUNT],
}

impl SchemaRegistry {
    pub fn for_shape(shape: BinShape) -> &'static SchemaRegistry {
        match shape {
            BinShape::Card => &CARD_REGISTRY,
            BinShape::Firmware => &FIRMWARE_REGISTRY,
        }
    }

    pub fn table(&self, index: usize) -> &TableSchema {
        &self.tables[index]
    }

    /// Decode order honoring dependency edges: a table is scheduled only
    /// after every table it consumes artifacts from, regardless of index.
    pub fn decode_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(TABLE_COUNT);
        let mut placed = [false; TABLE_COUNT];
        while order.len() < TABLE_COUNT {
            let mut progressed = false;
            for i in 0..TABLE_COUNT {
                if placed[i] {
                    continue;
                }
                if self.tables[i].deps.iter().all(|d| placed[*d]) {
                    placed[i] = true;
                    order.push(i);
                    progressed = true;
                }
            }
            // A dependency cycle would be a registry construction bug.
            assert!(progressed, "schema registry contains a dependency cycle");
        }
        order
    }
}

static CARD_REGISTRY: SchemaRegistry = SchemaRegistry {
    tables: [
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::FixedStride { stride: 66, record: RecordKind::ParticleEmitter }, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 2 }, &[]),
        schema(SchemaKind::Spans { offsets: 3 }, &[3]),
        schema(SchemaKind::LayerRecords { layer_lists: 4 }, &[4]),
        schema(SchemaKind::StringRecords, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 2 }, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 2 }, &[]),
        schema(SchemaKind::Spans { offsets: 8 }, &[8]),
        schema(SchemaKind::FixedStride { stride: 42, record: RecordKind::Item }, &[]),
        schema(SchemaKind::FixedStride { stride: 96, record: RecordKind::Character }, &[]),
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 4 }, &[]),
        schema(SchemaKind::Spans { offsets: 13 }, &[13]),
        schema(SchemaKind::GroupedSpans { offsets: 16, groups: 18 }, &[16, 18]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U32, scale: 2 }, &[]),
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::GroupList, &[]),
        schema(SchemaKind::CardId, &[]),
    ],
};

static FIRMWARE_REGISTRY: SchemaRegistry = SchemaRegistry {
    tables: [
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::FixedStride { stride: 66, record: RecordKind::ParticleEmitter }, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 2 }, &[]),
        schema(SchemaKind::Spans { offsets: 3 }, &[3]),
        schema(SchemaKind::LayerRecords { layer_lists: 4 }, &[4]),
        schema(SchemaKind::StringRecords, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 2 }, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 2 }, &[]),
        schema(SchemaKind::Spans { offsets: 8 }, &[8]),
        schema(SchemaKind::FixedStride { stride: 42, record: RecordKind::Item }, &[]),
        schema(SchemaKind::FixedStride { stride: 96, record: RecordKind::Character }, &[]),
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U16, scale: 4 }, &[]),
        schema(SchemaKind::Spans { offsets: 13 }, &[13]),
        schema(SchemaKind::FrameRecords, &[]),
        schema(SchemaKind::OffsetList { width: OffsetWidth::U32, scale: 2 }, &[]),
        schema(SchemaKind::Raw, &[]),
        schema(SchemaKind::FrameGroups { layers: 15 }, &[15]),
        schema(SchemaKind::CardId, &[]),
    ],
};

/// One `{start, len}` group entry. A `0xFFFF` start is padding: skipped,
/// never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub start: u16,
    pub len: u16,
}

pub const GROUP_SENTINEL: u16 = 0xFFFF;

impl GroupEntry {
    pub fn is_sentinel(&self) -> bool {
        self.start == GROUP_SENTINEL
    }
}

/// Artifacts produced by already-decoded tables, consumed by name by their
/// dependents. Threading this value through the dispatch loop replaces any
/// shared "last decoded offsets" state: decode order is a function of the
/// registry's dependency edges only.
#[derive(Debug, Default)]
pub struct DecodeContext {
    offsets: HashMap<usize, Vec<usize>>,
    spans: HashMap<usize, Vec<Vec<u16>>>,
    groups: HashMap<usize, Vec<GroupEntry>>,
}

impl DecodeContext {
    pub fn put_offsets(&mut self, table: usize, offsets: Vec<usize>) {
        self.offsets.insert(table, offsets);
    }

    pub fn offsets(&self, table: usize) -> &[usize] {
        self.offsets.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn put_spans(&mut self, table: usize, spans: Vec<Vec<u16>>) {
        self.spans.insert(table, spans);
    }

    pub fn spans(&self, table: usize) -> &[Vec<u16>] {
        self.spans.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn put_groups(&mut self, table: usize, groups: Vec<GroupEntry>) {
        self.groups.insert(table, groups);
    }

    pub fn groups(&self, table: usize) -> &[GroupEntry] {
        self.groups.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Fixed-stride invariant: a remainder means the schema does not match the
/// table, never that a partial record should be dropped.
pub fn check_stride(len: usize, stride: usize) -> Result<usize, SchemaError> {
    if len % stride != 0 {
        return Err(SchemaError::StrideMismatch { size: len, stride });
    }
    Ok(len / stride)
}

/// Decode an offset table into byte offsets.
pub fn decode_offset_list(
    view: &BufView<'_>,
    width: OffsetWidth,
    scale: usize,
) -> Result<Vec<usize>, SchemaError> {
    let entry_size = match width {
        OffsetWidth::U16 => 2,
        OffsetWidth::U32 => 4,
    };
    let count = check_stride(view.len(), entry_size)?;
    let mut offsets = Vec::with_capacity(count);
    for i in 0..count {
        let raw = match width {
            OffsetWidth::U16 => view.get_u16(i * 2).map_err(local)? as usize,
            OffsetWidth::U32 => view.get_u32(i * 4).map_err(local)? as usize,
        };
        offsets.push(raw * scale);
    }
    Ok(offsets)
}

/// Slice a table into word spans delimited by an offset list. Span `k`
/// covers `[offsets[k], offsets[k+1])`; the final span runs to the table
/// end (an end-marker offset therefore yields a trailing empty span,
/// which re-encodes back into the marker).
pub fn decode_spans(
    view: &BufView<'_>,
    offsets: &[usize],
) -> Result<Vec<Vec<u16>>, SchemaError> {
    let mut spans = Vec::with_capacity(offsets.len());
    for (k, start) in offsets.iter().copied().enumerate() {
        let end = offsets.get(k + 1).copied().unwrap_or(view.len());
        if end < start {
            return Err(SchemaError::OffsetsNotMonotonic { index: k, prev: start, next: end });
        }
        if end > view.len() {
            return Err(SchemaError::OffsetOutOfRange { offset: end, len: view.len() });
        }
        let span = view.slice(start, end - start).map_err(local)?;
        spans.push(span.words().map_err(local)?);
    }
    Ok(spans)
}

/// Decode a `{start, len}` group table, sentinels included (callers filter
/// through [`GroupEntry::is_sentinel`]; the raw list round-trips).
pub fn decode_group_list(view: &BufView<'_>) -> Result<Vec<GroupEntry>, SchemaError> {
    let count = check_stride(view.len(), 4)?;
    let mut groups = Vec::with_capacity(count);
    for i in 0..count {
        groups.push(GroupEntry {
            start: view.get_u16(i * 4).map_err(local)?,
            len: view.get_u16(i * 4 + 2).map_err(local)?,
        });
    }
    Ok(groups)
}

/// Downgrade a view failure to the containing table's schema fault.
pub fn local(e: StructuralError) -> SchemaError {
    match e {
        StructuralError::Truncated { offset, need, have } => {
            SchemaError::Truncated { offset, need, have }
        }
        // BufView only raises truncation; anything else is a logic bug.
        other => unreachable!("unexpected view error: {other}"),
    }
}
