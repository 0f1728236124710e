use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::entity::EntityId;
use crate::error::{ReferenceError, SchemaError};
use crate::schema::{GROUP_SENTINEL, GroupEntry, local};
use crate::view::{BufView, BufWriter};

/// Composition sequences with their grouping, as the card revision lays
/// them out: a sequence-data table delimited by a u32 word-offset index,
/// grouped by `{start, len}` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compositions {
    /// Delimited word sequences (the end-marker span included).
    pub sequences: Vec<Vec<u16>>,
    /// Raw group entries, sentinels included so the table round-trips.
    pub entries: Vec<GroupEntry>,
}

/// One resolved composition group: `len` consecutive sequences forming a
/// multi-layer entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionGroup<'a> {
    pub entry: GroupEntry,
    pub sequences: &'a [Vec<u16>],
}

impl Compositions {
    /// Non-sentinel groups resolved against the sequence list. A group
    /// pointing outside the list is reported and rendered empty rather
    /// than aborting the decode.
    pub fn groups(&self) -> Vec<CompositionGroup<'_>> {
        self.entries
            .iter()
            .filter(|e| !e.is_sentinel())
            .map(|e| match self.resolve(e) {
                Ok(sequences) => CompositionGroup { entry: *e, sequences },
                Err(err) => {
                    warn!(%err, "composition group unresolvable, rendered empty");
                    CompositionGroup { entry: *e, sequences: &[] }
                }
            })
            .collect()
    }

    fn resolve(&self, entry: &GroupEntry) -> Result<&[Vec<u16>], ReferenceError> {
        let start = entry.start as usize;
        let end = start + entry.len as usize;
        self.sequences
            .get(start..end)
            .ok_or(ReferenceError::GroupOutOfRange {
                start,
                len: entry.len as usize,
                available: self.sequences.len(),
            })
    }

    /// Encode into the three tables: sequence data, u32 word-offset index,
    /// group list.
    pub fn encode(&self, data: &mut BufWriter, offsets: &mut BufWriter, groups: &mut BufWriter) {
        for sequence in &self.sequences {
            offsets.put_u32((data.len() / 2) as u32);
            data.put_words(sequence);
        }
        for entry in &self.entries {
            groups.put_u16(entry.start);
            groups.put_u16(entry.len);
        }
    }
}

bitflags! {
    /// Field-presence mask of one frame layer record. Only the bits below
    /// carry payload words; the rest are plain flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFields: u16 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const SUBIMAGE = 1 << 2;
        const UNK1 = 1 << 4;
        const UNK2 = 1 << 5;
        const UNK3 = 1 << 8;
        const LAYER_TYPE = 1 << 9;
        const IMAGE = 1 << 10;
    }
}

impl Serialize for FrameFields {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for FrameFields {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(FrameFields::from_bits_retain(u16::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameLayerKind {
    Face,
    Npc,
    Body,
    HeadAccessory,
    FaceAccessory,
    BodyAccessory,
    DirtClouds,
    HandAccessory,
    Other(u16),
}

impl FrameLayerKind {
    pub fn from_word(word: u16) -> Self {
        match word {
            1 => Self::Face,
            2 => Self::Npc,
            3 => Self::Body,
            4 => Self::HeadAccessory,
            6 => Self::FaceAccessory,
            8 => Self::BodyAccessory,
            9 => Self::DirtClouds,
            10 => Self::HandAccessory,
            other => Self::Other(other),
        }
    }

    pub fn to_word(self) -> u16 {
        match self {
            Self::Face => 1,
            Self::Npc => 2,
            Self::Body => 3,
            Self::HeadAccessory => 4,
            Self::FaceAccessory => 6,
            Self::BodyAccessory => 8,
            Self::DirtClouds => 9,
            Self::HandAccessory => 10,
            Self::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayer {
    pub fields: FrameFields,
    pub x: i16,
    pub y: i16,
    pub subimage_index: u16,
    pub unknown1: u16,
    pub unknown2: u16,
    pub unknown3: u16,
    pub layer_type: Option<FrameLayerKind>,
    pub image_id: Option<EntityId>,
}

/// One frame: a run of consecutive layers, or the implicit sentinel the
/// device substitutes a built-in pose for. Raw words are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRef {
    pub start: u16,
    pub count: u16,
}

impl FrameRef {
    pub fn is_implicit(&self) -> bool {
        self.start == GROUP_SENTINEL
    }
}

/// Animation frames as the firmware revision lays them out.
pub const FRAMES_PER_GROUP: usize = 53;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTable {
    pub layers: Vec<FrameLayer>,
    pub frames: Vec<FrameRef>,
}

impl FrameTable {
    /// Frames folded into fixed-size character groups; a trailing partial
    /// group is not exposed (it still round-trips through `frames`).
    pub fn groups(&self) -> impl Iterator<Item = &[FrameRef]> {
        self.frames.chunks_exact(FRAMES_PER_GROUP)
    }

    /// Layers of one frame; implicit and dangling frames yield `None`.
    pub fn resolve(&self, frame: &FrameRef) -> Option<&[FrameLayer]> {
        if frame.is_implicit() {
            return None;
        }
        let start = frame.start as usize;
        let layers = self.layers.get(start..start + frame.count as usize);
        if layers.is_none() {
            warn!(
                start,
                count = frame.count,
                available = self.layers.len(),
                "frame references layers out of range"
            );
        }
        layers
    }

    /// Encode into layer records, the u32 layer word-offset index (end
    /// marker last) and the frame reference table.
    pub fn encode(&self, records: &mut BufWriter, offsets: &mut BufWriter, frames: &mut BufWriter) {
        for layer in &self.layers {
            offsets.put_u32((records.len() / 2) as u32);
            encode_layer(layer, records);
        }
        offsets.put_u32((records.len() / 2) as u32);
        for frame in &self.frames {
            frames.put_u16(frame.start);
            frames.put_u16(frame.count);
        }
    }
}

/// Decode the sequential bitmask-prefixed layer records.
pub fn decode_layers(view: &BufView<'_>) -> Result<Vec<FrameLayer>, SchemaError> {
    let mut layers = Vec::new();

    let mut i = 0;
    while i + 2 <= view.len() {
        let fields = FrameFields::from_bits_retain(view.get_u16(i).map_err(local)?);
        let mut layer = FrameLayer { fields, ..FrameLayer::default() };

        let mut next_u16 = |view: &BufView<'_>| -> Result<u16, SchemaError> {
            i += 2;
            view.get_u16(i).map_err(local)
        };

        if fields.contains(FrameFields::X) {
            layer.x = next_u16(view)? as i16;
        }
        if fields.contains(FrameFields::Y) {
            layer.y = next_u16(view)? as i16;
        }
        if fields.contains(FrameFields::SUBIMAGE) {
            layer.subimage_index = next_u16(view)?;
        }
        if fields.contains(FrameFields::UNK1) {
            layer.unknown1 = next_u16(view)?;
        }
        if fields.contains(FrameFields::UNK2) {
            layer.unknown2 = next_u16(view)?;
        }
        if fields.contains(FrameFields::UNK3) {
            layer.unknown3 = next_u16(view)?;
        }
        if fields.contains(FrameFields::LAYER_TYPE) {
            layer.layer_type = Some(FrameLayerKind::from_word(next_u16(view)?));
        }
        if fields.contains(FrameFields::IMAGE) {
            layer.image_id = Some(EntityId::from_word(next_u16(view)?));
        }

        layers.push(layer);
        i += 2;
    }

    Ok(layers)
}

fn encode_layer(layer: &FrameLayer, out: &mut BufWriter) {
    out.put_u16(layer.fields.bits());
    if layer.fields.contains(FrameFields::X) {
        out.put_i16(layer.x);
    }
    if layer.fields.contains(FrameFields::Y) {
        out.put_i16(layer.y);
    }
    if layer.fields.contains(FrameFields::SUBIMAGE) {
        out.put_u16(layer.subimage_index);
    }
    if layer.fields.contains(FrameFields::UNK1) {
        out.put_u16(layer.unknown1);
    }
    if layer.fields.contains(FrameFields::UNK2) {
        out.put_u16(layer.unknown2);
    }
    if layer.fields.contains(FrameFields::UNK3) {
        out.put_u16(layer.unknown3);
    }
    if layer.fields.contains(FrameFields::LAYER_TYPE) {
        out.put_u16(layer.layer_type.map(FrameLayerKind::to_word).unwrap_or(0));
    }
    if layer.fields.contains(FrameFields::IMAGE) {
        out.put_u16(layer.image_id.map(|id| id.to_word()).unwrap_or(0));
    }
}

/// Decode the frame reference table (4-byte records).
pub fn decode_frames(view: &BufView<'_>) -> Result<Vec<FrameRef>, SchemaError> {
    let count = crate::schema::check_stride(view.len(), 4)?;
    let mut frames = Vec::with_capacity(count);
    for i in 0..count {
        frames.push(FrameRef {
            start: view.get_u16(i * 4).map_err(local)?,
            count: view.get_u16(i * 4 + 2).map_err(local)?,
        });
    }
    Ok(frames)
}
