//! Sprite pack codec: the 4-region area holding indexed-color bitmap
//! assets (image definitions, subimage tiles, palettes, packed pixel
//! runs).

pub mod image;
pub mod palette;
pub mod subimage;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result, SchemaError, ValidationError};
use crate::view::{BufView, BufWriter};

pub use image::ImageDef;
pub use palette::{Color, PALETTE_COLORS, Palette};
pub use subimage::Subimage;

/// Four little-endian u32 region offsets.
pub const HEADER_BYTES: usize = 16;
/// The character-data region starts on a 32-byte boundary; the palette
/// region is zero-padded up to it.
const CHAR_DATA_ALIGN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpritePack {
    pub image_defs: Vec<ImageDef>,
    pub subimages: Vec<Subimage>,
    pub palettes: Vec<Palette>,
    /// Raw character-data region, kept as backing so bytes no subimage
    /// references still round-trip; encode overwrites each referenced run.
    pub char_data: Vec<u8>,
}

impl SpritePack {
    pub fn decode(view: &BufView<'_>) -> Result<Self> {
        let mut offsets = [0usize; 4];
        for (i, slot) in offsets.iter_mut().enumerate() {
            *slot = view.get_u32(i * 4).map_err(Error::from)? as usize;
        }
        for i in 0..3 {
            if offsets[i + 1] < offsets[i] {
                return Err(SchemaError::OffsetsNotMonotonic {
                    index: i,
                    prev: offsets[i],
                    next: offsets[i + 1],
                }
                .into());
            }
        }
        if offsets[3] > view.len() {
            return Err(SchemaError::OffsetOutOfRange { offset: offsets[3], len: view.len() }.into());
        }

        let region = |i: usize| {
            let end = if i + 1 < 4 { offsets[i + 1] } else { view.len() };
            view.slice(offsets[i], end - offsets[i]).map_err(Error::from)
        };

        let char_view = region(3)?;
        let subimages = subimage::decode(&region(1)?, &char_view)?;
        let mut image_defs = image::decode(&region(0)?)?;
        image::derive_frame_counts(&mut image_defs, subimages.len());
        let palettes = palette::decode(&region(2)?)?;
        debug!(
            images = image_defs.len(),
            subimages = subimages.len(),
            palettes = palettes.len(),
            "sprite pack decoded"
        );

        Ok(Self {
            image_defs,
            subimages,
            palettes,
            char_data: char_view.bytes().to_vec(),
        })
    }

    /// Subimages owned by one image definition.
    pub fn subimages_of(&self, image: &ImageDef) -> &[Subimage] {
        let start = image.subimage_start as usize;
        let count = image.frame_count * image.tiles_per_frame();
        self.subimages.get(start..start + count).unwrap_or_else(|| {
            warn!(
                start,
                count,
                available = self.subimages.len(),
                "image references subimages out of range"
            );
            &[]
        })
    }

    /// The flattened color set visible to an image: every palette run from
    /// its starting run to the end of the pool.
    pub fn visible_colors(&self, image: &ImageDef) -> Vec<Color> {
        let start = image.palette_start as usize;
        match self.palettes.get(start..) {
            Some(runs) => runs.iter().flat_map(|p| p.colors).collect(),
            None => {
                warn!(
                    start,
                    available = self.palettes.len(),
                    "image palette start out of range"
                );
                Vec::new()
            }
        }
    }

    /// Check that every pixel index stays within its image's visible
    /// colors; a violation blocks the commit naming the subimage.
    pub fn validate(&self) -> Result<()> {
        for image in &self.image_defs {
            let colors = self.visible_colors(image).len();
            let start = image.subimage_start as usize;
            for (i, sub) in self.subimages_of(image).iter().enumerate() {
                if let Some(bad) = sub.pixels.iter().find(|p| **p as usize >= colors) {
                    return Err(ValidationError::PixelOutOfPalette {
                        subimage: start + i,
                        index: *bad,
                        colors,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let mut image_bytes = BufWriter::new();
        image::encode(&self.image_defs, &mut image_bytes);
        let image_bytes = image_bytes.into_bytes();

        let mut def_bytes = BufWriter::new();
        let mut char_data = self.char_data.clone();
        subimage::encode(&self.subimages, &mut def_bytes, &mut char_data)?;
        let def_bytes = def_bytes.into_bytes();

        let mut palette_bytes = BufWriter::new();
        palette::encode(&self.palettes, &mut palette_bytes);
        let mut palette_bytes = palette_bytes.into_bytes();

        let image_offset = HEADER_BYTES;
        let def_offset = image_offset + image_bytes.len();
        let palette_offset = def_offset + def_bytes.len();
        let mut char_offset = palette_offset + palette_bytes.len();
        while char_offset % CHAR_DATA_ALIGN != 0 {
            char_offset += 1;
        }
        palette_bytes.resize(char_offset - palette_offset, 0);

        let mut out = BufWriter::with_capacity(char_offset + char_data.len());
        out.put_u32(image_offset as u32);
        out.put_u32(def_offset as u32);
        out.put_u32(palette_offset as u32);
        out.put_u32(char_offset as u32);
        out.put_bytes(&image_bytes);
        out.put_bytes(&def_bytes);
        out.put_bytes(&palette_bytes);
        out.put_bytes(&char_data);
        Ok(out.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::SpriteAttrs;

    fn attrs_2bpp_8x8() -> SpriteAttrs {
        SpriteAttrs::from_word(0).unwrap()
    }

    /// A 2-tile image at 2 bpp with one 4-color palette: the smallest
    /// pack exercising every region.
    fn build_fixture() -> SpritePack {
        let attrs = attrs_2bpp_8x8();
        let tile = |index: u16| Subimage {
            char_number: index,
            offset_x: 0,
            offset_y: 0,
            attrs,
            pixels: vec![index + 1; attrs.pixel_count()],
        };
        SpritePack {
            image_defs: vec![ImageDef {
                subimage_start: 0,
                width: 2,
                height: 1,
                palette_start: 0,
                frame_count: 1,
            }],
            subimages: vec![tile(0), tile(1)],
            palettes: vec![Palette {
                colors: [
                    Color { alpha: true, r: 0, g: 0, b: 0 },
                    Color { alpha: false, r: 248, g: 0, b: 0 },
                    Color { alpha: false, r: 0, g: 248, b: 0 },
                    Color { alpha: false, r: 0, g: 0, b: 248 },
                ],
            }],
            char_data: vec![0u8; 32],
        }
    }

    #[test]
    fn round_trip_is_byte_exact() {
        let mut pack = build_fixture();
        // Encode once to settle the char-data backing, then round-trip.
        let bytes = {
            let encoded = pack.encode().unwrap();
            let decoded = SpritePack::decode(&BufView::new(&encoded)).unwrap();
            pack = decoded;
            pack.encode().unwrap()
        };
        let decoded = SpritePack::decode(&BufView::new(&bytes)).unwrap();
        assert_eq!(decoded, pack);
        assert_eq!(decoded.encode().unwrap(), bytes);
    }

    #[test]
    fn two_tile_image_decodes_with_bounded_indices() {
        let pack = build_fixture();
        let bytes = pack.encode().unwrap();
        let decoded = SpritePack::decode(&BufView::new(&bytes)).unwrap();

        assert_eq!(decoded.image_defs.len(), 1);
        let image = &decoded.image_defs[0];
        assert_eq!(image.frame_count, 1);

        let tiles = decoded.subimages_of(image);
        assert_eq!(tiles.len(), 2);
        let colors = decoded.visible_colors(image);
        assert_eq!(colors.len(), 4);
        for tile in tiles {
            assert_eq!(tile.pixels.len(), tile.attrs.pixel_count());
            assert_eq!(tile.attrs.byte_count(), 16);
            assert!(tile.pixels.iter().all(|p| (*p as usize) < colors.len()));
        }
    }

    #[test]
    fn char_data_region_starts_aligned() {
        let bytes = build_fixture().encode().unwrap();
        let view = BufView::new(&bytes);
        let char_offset = view.get_u32(12).unwrap() as usize;
        assert_eq!(char_offset % CHAR_DATA_ALIGN, 0);
    }

    #[test]
    fn out_of_palette_pixel_blocks_encode() {
        let mut pack = build_fixture();
        pack.subimages[1].pixels[5] = 3;
        assert!(pack.encode().is_ok());
        // Shrink the visible set: no palettes at all.
        pack.palettes.clear();
        let err = pack.encode().unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::PixelOutOfPalette { subimage: 0, .. })
        ));
    }
}
