use serde::{Deserialize, Serialize};

use crate::bits::{BitReader, BitWriter, SpriteAttrs};
use crate::error::SchemaError;
use crate::schema::{self, local};
use crate::view::{BufView, BufWriter};

pub const SUBIMAGE_DEF_STRIDE: usize = 8;

/// One subimage tile: placement, packed attributes, and its unpacked
/// pixel plane (palette indices, row-major, `width * height` long).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subimage {
    /// Index of the tile's packed pixel run in the character-data region.
    pub char_number: u16,
    /// Placement relative to the pivot point.
    pub offset_x: i16,
    pub offset_y: i16,
    pub attrs: SpriteAttrs,
    pub pixels: Vec<u16>,
}

impl Subimage {
    /// Byte position of this tile's packed run in the character-data
    /// region.
    pub fn char_offset(&self) -> usize {
        self.char_number as usize * self.attrs.byte_count()
    }
}

/// Decode subimage definitions and unpack each tile's pixel plane from the
/// character-data region.
pub fn decode(defs: &BufView<'_>, char_data: &BufView<'_>) -> Result<Vec<Subimage>, SchemaError> {
    let count = schema::check_stride(defs.len(), SUBIMAGE_DEF_STRIDE)?;
    let mut subimages = Vec::with_capacity(count);

    for rec in 0..count {
        let i = rec * SUBIMAGE_DEF_STRIDE;
        let attrs = SpriteAttrs::from_word(defs.get_u16(i + 6).map_err(local)?)?;
        let char_number = defs.get_u16(i).map_err(local)?;

        let byte_count = attrs.byte_count();
        let run = char_data
            .slice(char_number as usize * byte_count, byte_count)
            .map_err(local)?;
        let pixels = unpack_pixels(run.bytes(), attrs.bpp as usize, attrs.pixel_count());

        subimages.push(Subimage {
            char_number,
            offset_x: defs.get_i16(i + 2).map_err(local)?,
            offset_y: defs.get_i16(i + 4).map_err(local)?,
            attrs,
            pixels,
        });
    }

    Ok(subimages)
}

/// Unpack an MSB-first bit run into `count` palette indices of `bpp` bits.
pub fn unpack_pixels(run: &[u8], bpp: usize, count: usize) -> Vec<u16> {
    let mut reader = BitReader::new(run);
    let mut pixels = Vec::with_capacity(count);
    for _ in 0..count {
        // The run is sized ceil(count * bpp / 8); a well-formed run never
        // underflows here.
        pixels.push(reader.read(bpp).unwrap_or(0));
    }
    pixels
}

/// Pack a pixel plane back into its MSB-first run.
pub fn pack_pixels(pixels: &[u16], bpp: usize) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for pixel in pixels {
        writer.write(*pixel, bpp);
    }
    writer.finish()
}

/// Encode the definition records and overwrite each tile's packed run in
/// the character-data backing. An edited attribute outside its class
/// lookup rejects the whole encode.
pub fn encode(
    subimages: &[Subimage],
    defs: &mut BufWriter,
    char_data: &mut Vec<u8>,
) -> crate::error::Result<()> {
    for sub in subimages {
        defs.put_u16(sub.char_number);
        defs.put_i16(sub.offset_x);
        defs.put_i16(sub.offset_y);
        defs.put_u16(sub.attrs.to_word()?);

        let run = pack_pixels(&sub.pixels, sub.attrs.bpp as usize);
        let start = sub.char_offset();
        let end = start + run.len();
        if char_data.len() < end {
            char_data.resize(end, 0);
        }
        char_data[start..end].copy_from_slice(&run);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_accounting() {
        // 8x8 tile at 2 bpp: 64 pixels from 16 bytes.
        let run: Vec<u8> = (0..16).collect();
        let pixels = unpack_pixels(&run, 2, 64);
        assert_eq!(pixels.len(), 64);
        assert_eq!(pack_pixels(&pixels, 2), run);
    }

    #[test]
    fn msb_first_within_each_byte() {
        let pixels = unpack_pixels(&[0b11_01_00_10], 2, 4);
        assert_eq!(pixels, vec![0b11, 0b01, 0b00, 0b10]);
    }

    #[test]
    fn tile_runs_addressed_by_char_number() {
        // Two 8x8 2bpp tiles: tile 0 all index 1, tile 1 all index 2.
        let mut char_bytes = vec![0b01010101u8; 16];
        char_bytes.extend(vec![0b10101010u8; 16]);

        let mut defs = Vec::new();
        for (char_number, x) in [(0u16, 1i16), (1, -1)] {
            defs.extend_from_slice(&char_number.to_le_bytes());
            defs.extend_from_slice(&x.to_le_bytes());
            defs.extend_from_slice(&0i16.to_le_bytes());
            defs.extend_from_slice(&0u16.to_le_bytes()); // 8x8, 2 bpp
        }

        let subimages =
            decode(&BufView::new(&defs), &BufView::new(&char_bytes)).unwrap();
        assert_eq!(subimages.len(), 2);
        assert!(subimages[0].pixels.iter().all(|p| *p == 1));
        assert!(subimages[1].pixels.iter().all(|p| *p == 2));
        assert_eq!(subimages[1].offset_x, -1);

        let mut def_out = BufWriter::new();
        let mut char_out = vec![0u8; 0];
        encode(&subimages, &mut def_out, &mut char_out).unwrap();
        assert_eq!(def_out.into_bytes(), defs);
        assert_eq!(char_out, char_bytes);
    }
}
