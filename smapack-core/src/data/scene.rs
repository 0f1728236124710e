use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::entity::EntityId;
use crate::error::SchemaError;
use crate::schema::local;
use crate::view::{BufView, BufWriter};

bitflags! {
    /// Field-presence mask of one scene layer record. Bits 12..16 are
    /// plain flags without payload words.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LayerFields: u16 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const IMAGE = 1 << 2;
        const UNK1 = 1 << 3;
        const UNK2 = 1 << 4;
        const UNK3 = 1 << 5;
        const SUBIMAGE = 1 << 6;
        const UNK4 = 1 << 7;
        const UNK5 = 1 << 8;
        const UNK6 = 1 << 9;
        const UNK7 = 1 << 10;
        const UNK8 = 1 << 11;
        const FLAG1 = 1 << 12;
        const FLAG2 = 1 << 13;
        const FLAG3 = 1 << 14;
        const FLAG4 = 1 << 15;
    }
}

impl Serialize for LayerFields {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for LayerFields {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(LayerFields::from_bits_retain(u16::deserialize(deserializer)?))
    }
}

/// One layer of a scene layout. The presence mask is kept as decoded so a
/// re-encode reproduces the record even where a present field holds zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneLayer {
    pub fields: LayerFields,
    pub x: i16,
    pub y: i16,
    pub image_id: Option<EntityId>,
    pub subimage_index: u16,
    pub unknown1: i16,
    pub unknown2: u16,
    pub unknown3: u16,
    pub unknown4: u16,
    pub unknown5: u16,
    pub unknown6: u16,
    pub unknown7: u16,
    pub unknown8: u16,
}

impl SceneLayer {
    pub fn flag1(&self) -> bool {
        self.fields.contains(LayerFields::FLAG1)
    }

    pub fn flag2(&self) -> bool {
        self.fields.contains(LayerFields::FLAG2)
    }

    pub fn flag3(&self) -> bool {
        self.fields.contains(LayerFields::FLAG3)
    }

    pub fn flag4(&self) -> bool {
        self.fields.contains(LayerFields::FLAG4)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub layers: Vec<SceneLayer>,
}

/// Decode scene layers. `layer_lists` is the sibling table's artifact: one
/// word-offset list per scene (the final end-marker span is dropped).
pub fn decode(view: &BufView<'_>, layer_lists: &[Vec<u16>]) -> Result<Vec<Scene>, SchemaError> {
    let scene_count = layer_lists.len().saturating_sub(1);
    let mut scenes = Vec::with_capacity(scene_count);

    for list in layer_lists.iter().take(scene_count) {
        let mut layers = Vec::with_capacity(list.len());
        for word_offset in list {
            let offset = *word_offset as usize * 2;
            if offset + 2 > view.len() {
                warn!(offset, len = view.len(), "scene layer offset out of range, skipped");
                continue;
            }
            layers.push(decode_layer(view, offset)?);
        }
        scenes.push(Scene { layers });
    }

    Ok(scenes)
}

fn decode_layer(view: &BufView<'_>, start: usize) -> Result<SceneLayer, SchemaError> {
    let fields = LayerFields::from_bits_retain(view.get_u16(start).map_err(local)?);
    let mut layer = SceneLayer { fields, ..SceneLayer::default() };

    let mut i = start;
    let mut next_u16 = |view: &BufView<'_>| -> Result<u16, SchemaError> {
        i += 2;
        view.get_u16(i).map_err(local)
    };

    if fields.contains(LayerFields::X) {
        layer.x = next_u16(view)? as i16;
    }
    if fields.contains(LayerFields::Y) {
        layer.y = next_u16(view)? as i16;
    }
    if fields.contains(LayerFields::IMAGE) {
        layer.image_id = Some(EntityId::from_word(next_u16(view)?));
    }
    if fields.contains(LayerFields::UNK1) {
        layer.unknown1 = next_u16(view)? as i16;
    }
    if fields.contains(LayerFields::UNK2) {
        layer.unknown2 = next_u16(view)?;
    }
    if fields.contains(LayerFields::UNK3) {
        layer.unknown3 = next_u16(view)?;
    }
    if fields.contains(LayerFields::SUBIMAGE) {
        layer.subimage_index = next_u16(view)?;
    }
    if fields.contains(LayerFields::UNK4) {
        layer.unknown4 = next_u16(view)?;
    }
    if fields.contains(LayerFields::UNK5) {
        layer.unknown5 = next_u16(view)?;
    }
    if fields.contains(LayerFields::UNK6) {
        layer.unknown6 = next_u16(view)?;
    }
    if fields.contains(LayerFields::UNK7) {
        layer.unknown7 = next_u16(view)?;
    }
    if fields.contains(LayerFields::UNK8) {
        layer.unknown8 = next_u16(view)?;
    }

    Ok(layer)
}

/// Encode scenes into the canonical three-table layout: scene offsets
/// (word index into the layer-offset table, end marker last), per-scene
/// layer offsets (word index into the layer table), and the layer records
/// themselves, each scene's run closed by a zero word.
pub fn encode(scenes: &[Scene], offsets: &mut BufWriter, lists: &mut BufWriter, records: &mut BufWriter) {
    for scene in scenes {
        offsets.put_u16((lists.len() / 2) as u16);
        for layer in &scene.layers {
            lists.put_u16((records.len() / 2) as u16);
            encode_layer(layer, records);
        }
        records.put_u16(0);
    }
    offsets.put_u16((lists.len() / 2) as u16);
}

fn encode_layer(layer: &SceneLayer, out: &mut BufWriter) {
    out.put_u16(layer.fields.bits());
    if layer.fields.contains(LayerFields::X) {
        out.put_i16(layer.x);
    }
    if layer.fields.contains(LayerFields::Y) {
        out.put_i16(layer.y);
    }
    if layer.fields.contains(LayerFields::IMAGE) {
        out.put_u16(layer.image_id.map(|id| id.to_word()).unwrap_or(0));
    }
    if layer.fields.contains(LayerFields::UNK1) {
        out.put_i16(layer.unknown1);
    }
    if layer.fields.contains(LayerFields::UNK2) {
        out.put_u16(layer.unknown2);
    }
    if layer.fields.contains(LayerFields::UNK3) {
        out.put_u16(layer.unknown3);
    }
    if layer.fields.contains(LayerFields::SUBIMAGE) {
        out.put_u16(layer.subimage_index);
    }
    if layer.fields.contains(LayerFields::UNK4) {
        out.put_u16(layer.unknown4);
    }
    if layer.fields.contains(LayerFields::UNK5) {
        out.put_u16(layer.unknown5);
    }
    if layer.fields.contains(LayerFields::UNK6) {
        out.put_u16(layer.unknown6);
    }
    if layer.fields.contains(LayerFields::UNK7) {
        out.put_u16(layer.unknown7);
    }
    if layer.fields.contains(LayerFields::UNK8) {
        out.put_u16(layer.unknown8);
    }
}
