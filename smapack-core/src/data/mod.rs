//! Data pack codec: the 20-table region holding non-graphical game data.
//!
//! The offset header is resolved first, then every table is dispatched
//! through the per-shape [`SchemaRegistry`] in dependency order. A table
//! that violates its schema is reported as a [`TableFault`] and preserved
//! verbatim; its siblings still decode.

pub mod character;
pub mod emitter;
pub mod entity;
pub mod frame;
pub mod item;
pub mod scene;
pub mod string;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result, SchemaError, StructuralError, TableFault, ValidationError};
use crate::schema::{
    self, BinShape, DecodeContext, RecordKind, SchemaKind, SchemaRegistry, TABLE_COUNT, local,
};
use crate::text::{CharTable, StringValue};
use crate::view::{BufView, BufWriter};

pub use character::Character;
pub use emitter::ParticleEmitter;
pub use entity::EntityId;
pub use frame::{Compositions, FrameTable};
pub use item::Item;
pub use scene::Scene;
pub use string::DialogString;

/// The offset header: 20 little-endian u32 word-offsets.
pub const HEADER_BYTES: usize = TABLE_COUNT * 4;

const TABLE_TABLE9: usize = 9;
const TABLE_NODES: usize = 14;
const TABLE_CARD_ID: usize = 19;

/// Tables that encode jointly; a fault in one preserves the whole family
/// verbatim so the pack re-encodes consistently.
const TABLE_FAMILIES: &[&[usize]] = &[
    &[3, 4, 5],
    &[6, 7],
    &[8, 9],
    &[13, 14],
    &[15, 16, 18],
];

/// Animation data differs between format revisions; which variant decodes
/// is a property of the registry, never of probing the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Animations {
    Compositions(Compositions),
    Frames(FrameTable),
}

/// Decoded data pack. Tables with undocumented schemas (and any table that
/// faulted) are carried as raw bytes so the pack re-encodes byte-exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPack {
    pub shape: BinShape,
    /// Numeric card/build id (first word of table 19).
    pub card_id: u16,
    /// Remaining words of table 19, purpose undocumented.
    pub card_id_tail: Vec<u16>,
    pub emitters: Vec<ParticleEmitter>,
    pub scenes: Vec<Scene>,
    pub strings: Vec<DialogString>,
    /// Offset-delimited word sequences of table 9, purpose undocumented.
    pub table9: Vec<Vec<u16>>,
    pub items: Vec<Item>,
    pub characters: Vec<Character>,
    /// Offset-delimited word sequences of the graphics-node table.
    pub graphics_nodes: Vec<Vec<u16>>,
    pub animations: Animations,
    pub raw_tables: BTreeMap<usize, Vec<u8>>,
}

impl DataPack {
    fn empty(shape: BinShape) -> Self {
        let animations = match shape {
            BinShape::Card => Animations::Compositions(Compositions::default()),
            BinShape::Firmware => Animations::Frames(FrameTable::default()),
        };
        Self {
            shape,
            card_id: 0,
            card_id_tail: Vec::new(),
            emitters: Vec::new(),
            scenes: Vec::new(),
            strings: Vec::new(),
            table9: Vec::new(),
            items: Vec::new(),
            characters: Vec::new(),
            graphics_nodes: Vec::new(),
            animations,
            raw_tables: BTreeMap::new(),
        }
    }

    /// Every codepoint currently in use by a text field, for re-validating
    /// a character-table import.
    pub fn used_codes(&self) -> BTreeSet<u16> {
        let mut codes = BTreeSet::new();
        let mut take = |value: &StringValue| codes.extend(value.codes.iter().copied());
        for s in &self.strings {
            take(&s.value);
        }
        for item in &self.items {
            take(&item.name);
        }
        for ch in &self.characters {
            take(&ch.name);
            take(&ch.pronoun);
            take(&ch.statement);
            take(&ch.question1);
            take(&ch.question2);
        }
        codes
    }

    /// Re-render every text field after the active table changed.
    pub fn rerender_text(&mut self, table: &CharTable) {
        for s in &mut self.strings {
            s.value.rerender(table);
        }
        for item in &mut self.items {
            item.name.rerender(table);
        }
        for ch in &mut self.characters {
            ch.name.rerender(table);
            ch.pronoun.rerender(table);
            ch.statement.rerender(table);
            ch.question1.rerender(table);
            ch.question2.rerender(table);
        }
    }

    /// Field-level bounds that must hold before a commit re-encodes.
    pub fn validate(&self) -> Result<()> {
        for item in &self.items {
            check_width("item.name", &item.name, item::ITEM_NAME_WORDS)?;
        }
        for ch in &self.characters {
            check_width("character.name", &ch.name, character::CHARACTER_NAME_WORDS)?;
            check_width("character.pronoun", &ch.pronoun, character::SPEECH_WORDS)?;
            check_width("character.statement", &ch.statement, character::SPEECH_WORDS)?;
            check_width("character.question1", &ch.question1, character::SPEECH_WORDS)?;
            check_width("character.question2", &ch.question2, character::SPEECH_WORDS)?;
        }
        Ok(())
    }

    /// Re-encode the pack: every table rebuilt bottom-up, then the offset
    /// header recomputed from the new table sizes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut tables: Vec<Vec<u8>> = vec![Vec::new(); TABLE_COUNT];

        let mut emitters = BufWriter::new();
        emitter::encode(&self.emitters, &mut emitters);
        tables[2] = emitters.into_bytes();

        let (mut offsets, mut lists, mut records) =
            (BufWriter::new(), BufWriter::new(), BufWriter::new());
        scene::encode(&self.scenes, &mut offsets, &mut lists, &mut records);
        tables[3] = offsets.into_bytes();
        tables[4] = lists.into_bytes();
        tables[5] = records.into_bytes();

        let (mut records, mut offsets) = (BufWriter::new(), BufWriter::new());
        string::encode(&self.strings, &mut records, &mut offsets);
        tables[6] = records.into_bytes();
        tables[7] = offsets.into_bytes();

        (tables[8], tables[9]) = encode_spans(&self.table9, 2);

        let mut items = BufWriter::new();
        item::encode(&self.items, &mut items);
        tables[10] = items.into_bytes();

        let mut characters = BufWriter::new();
        character::encode(&self.characters, &mut characters);
        tables[11] = characters.into_bytes();

        (tables[13], tables[14]) = encode_spans(&self.graphics_nodes, 4);

        match &self.animations {
            Animations::Compositions(comps) => {
                let (mut data, mut offsets, mut groups) =
                    (BufWriter::new(), BufWriter::new(), BufWriter::new());
                comps.encode(&mut data, &mut offsets, &mut groups);
                tables[15] = data.into_bytes();
                tables[16] = offsets.into_bytes();
                tables[18] = groups.into_bytes();
            }
            Animations::Frames(frames) => {
                let (mut records, mut offsets, mut refs) =
                    (BufWriter::new(), BufWriter::new(), BufWriter::new());
                frames.encode(&mut records, &mut offsets, &mut refs);
                tables[15] = records.into_bytes();
                tables[16] = offsets.into_bytes();
                tables[18] = refs.into_bytes();
            }
        }

        let mut id_table = BufWriter::new();
        id_table.put_u16(self.card_id);
        id_table.put_words(&self.card_id_tail);
        tables[TABLE_CARD_ID] = id_table.into_bytes();

        for (index, bytes) in &self.raw_tables {
            tables[*index] = bytes.clone();
        }

        let total: usize = HEADER_BYTES + tables.iter().map(Vec::len).sum::<usize>();
        let mut out = BufWriter::with_capacity(total);
        let mut running = HEADER_BYTES;
        for table in &tables {
            debug_assert!(running % 2 == 0, "table offsets have word granularity");
            out.put_u32((running / 2) as u32);
            running += table.len();
        }
        for table in tables {
            out.put_bytes(&table);
        }
        Ok(out.into_bytes())
    }
}

fn check_width(field: &'static str, value: &StringValue, max: usize) -> Result<()> {
    if value.codes.len() > max {
        return Err(ValidationError::TextTooLong { field, len: value.codes.len(), max }.into());
    }
    Ok(())
}

/// Embedded fixed-width text: `width` words, zero-padded; zero words carry
/// no codepoint.
pub(crate) fn read_padded_text(
    view: &BufView<'_>,
    offset: usize,
    width: usize,
    table: &CharTable,
) -> std::result::Result<StringValue, SchemaError> {
    let mut codes = Vec::new();
    for i in 0..width {
        let word = view.get_u16(offset + i * 2).map_err(local)?;
        if word != 0 {
            codes.push(word);
        }
    }
    Ok(StringValue::from_codes(table, codes))
}

pub(crate) fn put_padded_codes(out: &mut BufWriter, codes: &[u16], width: usize) {
    debug_assert!(codes.len() <= width);
    out.put_words(codes);
    for _ in codes.len()..width {
        out.put_u16(0);
    }
}

fn encode_spans(spans: &[Vec<u16>], scale: usize) -> (Vec<u8>, Vec<u8>) {
    let mut offsets = BufWriter::new();
    let mut data = BufWriter::new();
    for span in spans {
        offsets.put_u16((data.len() / scale) as u16);
        data.put_words(span);
    }
    (offsets.into_bytes(), data.into_bytes())
}

/// Resolve the 20-table offset header into byte ranges.
fn table_layout(view: &BufView<'_>) -> Result<(Vec<usize>, Vec<usize>)> {
    if view.len() < HEADER_BYTES {
        return Err(StructuralError::Truncated {
            offset: view.base(),
            need: HEADER_BYTES,
            have: view.len(),
        }
        .into());
    }

    let mut offsets = Vec::with_capacity(TABLE_COUNT);
    for i in 0..TABLE_COUNT {
        // Stored at word granularity.
        offsets.push(view.get_u32(i * 4).map_err(Error::from)? as usize * 2);
    }
    for i in 0..TABLE_COUNT - 1 {
        if offsets[i + 1] < offsets[i] {
            return Err(SchemaError::OffsetsNotMonotonic {
                index: i,
                prev: offsets[i],
                next: offsets[i + 1],
            }
            .into());
        }
    }
    if offsets[TABLE_COUNT - 1] > view.len() {
        return Err(SchemaError::OffsetOutOfRange {
            offset: offsets[TABLE_COUNT - 1],
            len: view.len(),
        }
        .into());
    }

    let mut sizes = Vec::with_capacity(TABLE_COUNT);
    for i in 0..TABLE_COUNT {
        let end = if i + 1 < TABLE_COUNT { offsets[i + 1] } else { view.len() };
        sizes.push(end - offsets[i]);
    }
    Ok((offsets, sizes))
}

/// Decode a data pack. Schema faults are collected per table; the rest of
/// the pack still decodes (and faulted tables re-encode verbatim).
pub fn decode(
    view: &BufView<'_>,
    shape: BinShape,
    chars: &CharTable,
) -> Result<(DataPack, Vec<TableFault>)> {
    let (offsets, sizes) = table_layout(view)?;
    let registry = SchemaRegistry::for_shape(shape);

    let mut pack = DataPack::empty(shape);
    let mut ctx = DecodeContext::default();
    let mut faults: Vec<TableFault> = Vec::new();
    let mut frame_layers: Vec<frame::FrameLayer> = Vec::new();
    let mut frame_refs: Vec<frame::FrameRef> = Vec::new();

    for table in registry.decode_order() {
        let range = offsets[table]..offsets[table] + sizes[table];
        let tview = view.slice(range.start, sizes[table]).map_err(Error::from)?;
        debug!(table, start = range.start, len = sizes[table], "decoding table");

        let schema_def = registry.table(table);
        if let Some(dep) = schema_def
            .deps
            .iter()
            .find(|d| faults.iter().any(|f| f.table == **d))
        {
            faults.push(TableFault {
                table,
                range,
                error: SchemaError::DependencyFailed { table: *dep },
            });
            continue;
        }

        let result: std::result::Result<(), SchemaError> = match schema_def.kind {
            SchemaKind::Raw => {
                pack.raw_tables.insert(table, tview.bytes().to_vec());
                Ok(())
            }
            SchemaKind::FixedStride { record, .. } => match record {
                RecordKind::ParticleEmitter => {
                    emitter::decode(&tview).map(|v| pack.emitters = v)
                }
                RecordKind::Item => item::decode(&tview, chars).map(|v| pack.items = v),
                RecordKind::Character => {
                    character::decode(&tview, chars).map(|v| pack.characters = v)
                }
            },
            SchemaKind::OffsetList { width, scale } => {
                schema::decode_offset_list(&tview, width, scale)
                    .map(|v| ctx.put_offsets(table, v))
            }
            SchemaKind::GroupList => {
                schema::decode_group_list(&tview).map(|v| ctx.put_groups(table, v))
            }
            SchemaKind::StringRecords => {
                string::decode(&tview, chars).map(|v| pack.strings = v)
            }
            SchemaKind::Spans { offsets } => {
                schema::decode_spans(&tview, ctx.offsets(offsets))
                    .map(|v| ctx.put_spans(table, v))
            }
            SchemaKind::GroupedSpans { offsets, groups } => {
                schema::decode_spans(&tview, ctx.offsets(offsets)).map(|sequences| {
                    pack.animations = Animations::Compositions(Compositions {
                        sequences,
                        entries: ctx.groups(groups).to_vec(),
                    });
                })
            }
            SchemaKind::LayerRecords { layer_lists } => {
                scene::decode(&tview, ctx.spans(layer_lists)).map(|v| pack.scenes = v)
            }
            SchemaKind::FrameRecords => {
                frame::decode_layers(&tview).map(|v| frame_layers = v)
            }
            SchemaKind::FrameGroups { .. } => {
                frame::decode_frames(&tview).map(|v| frame_refs = v)
            }
            SchemaKind::CardId => {
                if tview.len() >= 2 {
                    pack.card_id = tview.get_u16(0).map_err(local)?;
                    pack.card_id_tail = tview
                        .slice(2, tview.len() - 2)
                        .map_err(local)?
                        .words()
                        .map_err(local)?;
                }
                Ok(())
            }
        };

        if let Err(error) = result {
            warn!(table, %error, "table failed to decode, preserving raw bytes");
            faults.push(TableFault { table, range, error });
        }
    }

    pack.table9 = ctx.spans(TABLE_TABLE9).to_vec();
    pack.graphics_nodes = ctx.spans(TABLE_NODES).to_vec();
    if shape == BinShape::Firmware {
        pack.animations = Animations::Frames(FrameTable {
            layers: frame_layers,
            frames: frame_refs,
        });
    }

    // Preserve every faulted table (and its encode family) verbatim.
    for fault in &faults {
        for member in family_of(fault.table) {
            if let Ok(raw) = view.slice(offsets[member], sizes[member]) {
                pack.raw_tables.entry(member).or_insert_with(|| raw.bytes().to_vec());
            }
        }
    }

    Ok((pack, faults))
}

fn family_of(table: usize) -> Vec<usize> {
    for family in TABLE_FAMILIES {
        if family.contains(&table) {
            return family.to_vec();
        }
    }
    vec![table]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::GroupEntry;

    /// A minimal, canonical card-shape pack exercising every schema family.
    fn build_fixture() -> Vec<u8> {
        let chars = CharTable::japanese();
        let mut pack = DataPack::empty(BinShape::Card);
        pack.card_id = 0x0005;
        pack.card_id_tail = vec![0xAAAA, 0xBBBB];
        pack.emitters = vec![ParticleEmitter { words: vec![0x1111; 33] }];
        pack.scenes = vec![Scene {
            layers: vec![scene::SceneLayer {
                fields: scene::LayerFields::X | scene::LayerFields::SUBIMAGE,
                x: -2,
                subimage_index: 3,
                ..scene::SceneLayer::default()
            }],
        }];
        pack.strings = vec![DialogString {
            id: EntityId { card_id: None, entity_id: 5 },
            unknown1: 0,
            unknown2: 0,
            unknown3: 0,
            value: StringValue::from_text(&chars, "AB").unwrap(),
        }];
        pack.table9 = vec![vec![1, 2, 3], vec![4], vec![]];
        pack.graphics_nodes = vec![vec![0x8501, 0x0001], vec![]];
        pack.animations = Animations::Compositions(Compositions {
            sequences: vec![vec![9, 8, 7], vec![6, 5], vec![]],
            entries: vec![
                GroupEntry { start: 0, len: 2 },
                GroupEntry { start: 0xFFFF, len: 0 },
            ],
        });
        pack.raw_tables.insert(0, vec![0x10, 0x00]);
        pack.raw_tables.insert(17, vec![0x22, 0x00, 0x33, 0x00]);
        pack.encode().unwrap()
    }

    #[test]
    fn fixture_round_trips_byte_exactly() {
        let chars = CharTable::japanese();
        let bytes = build_fixture();
        let (pack, faults) = decode(&BufView::new(&bytes), BinShape::Card, &chars).unwrap();
        assert!(faults.is_empty(), "unexpected faults: {faults:?}");

        assert_eq!(pack.card_id, 0x0005);
        assert_eq!(pack.emitters.len(), 1);
        assert_eq!(pack.scenes.len(), 1);
        assert_eq!(pack.strings[0].value.text, "ＡＢ");
        assert_eq!(pack.table9.len(), 3);
        match &pack.animations {
            Animations::Compositions(comps) => {
                let groups = comps.groups();
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0].sequences.len(), 2);
            }
            other => panic!("unexpected animations: {other:?}"),
        }

        let reencoded = pack.encode().unwrap();
        assert_eq!(reencoded, bytes);
    }

    #[test]
    fn table_offsets_are_monotonic_with_nonnegative_sizes() {
        let bytes = build_fixture();
        let view = BufView::new(&bytes);
        let (offsets, sizes) = table_layout(&view).unwrap();
        for i in 0..TABLE_COUNT - 1 {
            assert!(offsets[i] <= offsets[i + 1]);
        }
        assert_eq!(offsets[0], HEADER_BYTES);
        assert_eq!(offsets[TABLE_COUNT - 1] + sizes[TABLE_COUNT - 1], bytes.len());
    }

    #[test]
    fn stride_fault_is_partial_and_preserves_bytes() {
        let chars = CharTable::japanese();
        let mut bytes = build_fixture();

        // Grow the item table (index 10) by two bytes so its size is no
        // longer a multiple of the 42-byte stride: shift offsets of the
        // tables after it.
        let insert_at = {
            let view = BufView::new(&bytes);
            table_layout(&view).unwrap().0[11]
        };
        bytes.splice(insert_at..insert_at, [0u8, 0]);
        for table in 11..TABLE_COUNT {
            let pos = table * 4;
            let old = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
            bytes[pos..pos + 4].copy_from_slice(&(old + 1).to_le_bytes());
        }

        let (pack, faults) = decode(&BufView::new(&bytes), BinShape::Card, &chars).unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].table, 10);
        assert!(matches!(faults[0].error, SchemaError::StrideMismatch { .. }));
        assert!(pack.items.is_empty());
        // Siblings decoded normally.
        assert_eq!(pack.strings.len(), 1);
        assert_eq!(pack.emitters.len(), 1);
        // The faulted table still round-trips.
        assert_eq!(pack.encode().unwrap(), bytes);
    }

    #[test]
    fn used_codes_cover_all_text_fields() {
        let chars = CharTable::japanese();
        let bytes = build_fixture();
        let (pack, _) = decode(&BufView::new(&bytes), BinShape::Card, &chars).unwrap();
        let codes = pack.used_codes();
        assert!(codes.contains(&0x00CC));
        assert!(codes.contains(&0x00CD));
    }
}
