use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::{self, local};
use crate::view::{BufView, BufWriter};

pub const IMAGE_DEF_STRIDE: usize = 6;

/// One image definition: a grid of subimage tiles and the palette run the
/// image starts drawing from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDef {
    /// Index of the first subimage belonging to this image.
    pub subimage_start: u16,
    /// Grid width in tiles.
    pub width: u8,
    /// Grid height in tiles.
    pub height: u8,
    /// Index of the first palette run; the visible color set extends from
    /// here to the end of the palette pool.
    pub palette_start: u16,
    /// Derived: frames in this image (consecutive-start differencing
    /// against the next image, divided by tiles per frame).
    pub frame_count: usize,
}

impl ImageDef {
    pub fn tiles_per_frame(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

pub fn decode(view: &BufView<'_>) -> Result<Vec<ImageDef>, SchemaError> {
    let count = schema::check_stride(view.len(), IMAGE_DEF_STRIDE)?;
    let mut defs = Vec::with_capacity(count);
    for rec in 0..count {
        let i = rec * IMAGE_DEF_STRIDE;
        defs.push(ImageDef {
            subimage_start: view.get_u16(i).map_err(local)?,
            width: view.get_u8(i + 2).map_err(local)?,
            height: view.get_u8(i + 3).map_err(local)?,
            palette_start: view.get_u16(i + 4).map_err(local)?,
            frame_count: 0,
        });
    }
    Ok(defs)
}

/// Fill in each definition's frame count from the subimage range it owns.
pub fn derive_frame_counts(defs: &mut [ImageDef], subimage_count: usize) {
    for i in 0..defs.len() {
        let next_start = defs
            .get(i + 1)
            .map(|d| d.subimage_start as usize)
            .unwrap_or(subimage_count);
        let owned = next_start.saturating_sub(defs[i].subimage_start as usize);
        let per_frame = defs[i].tiles_per_frame();
        defs[i].frame_count = if per_frame == 0 { 0 } else { owned / per_frame };
    }
}

pub fn encode(defs: &[ImageDef], out: &mut BufWriter) {
    for def in defs {
        out.put_u16(def.subimage_start);
        out.put_u8(def.width);
        out.put_u8(def.height);
        out.put_u16(def.palette_start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_counts_from_consecutive_starts() {
        let bytes = [
            0u8, 0, 2, 1, 0, 0, // image 0: 2x1 tiles from subimage 0
            6, 0, 1, 1, 2, 0, // image 1: 1x1 tiles from subimage 6
        ];
        let mut defs = decode(&BufView::new(&bytes)).unwrap();
        derive_frame_counts(&mut defs, 8);
        assert_eq!(defs[0].frame_count, 3); // 6 tiles / 2 per frame
        assert_eq!(defs[1].frame_count, 2); // 2 tiles / 1 per frame
        assert_eq!(defs[1].palette_start, 2);

        let mut out = BufWriter::new();
        encode(&defs, &mut out);
        assert_eq!(out.into_bytes(), bytes);
    }
}
