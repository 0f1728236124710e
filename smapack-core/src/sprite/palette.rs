use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::schema::local;
use crate::view::{BufView, BufWriter};

/// Colors per palette run.
pub const PALETTE_COLORS: usize = 4;

/// One 16-bit palette entry: alpha in bit 15, 5-bit channels widened to 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub alpha: bool,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn from_word(word: u16) -> Self {
        Self {
            alpha: word >> 15 != 0,
            r: ((word & 0x7c00) >> 7) as u8,
            g: ((word & 0x03e0) >> 2) as u8,
            b: ((word & 0x001f) << 3) as u8,
        }
    }

    pub fn to_word(&self) -> u16 {
        let mut word = ((self.r as u16) << 7) & 0x7c00;
        word |= ((self.g as u16) << 2) & 0x03e0;
        word |= (self.b as u16) >> 3;
        if self.alpha {
            word |= 0x8000;
        }
        word
    }
}

/// A run of exactly four colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub colors: [Color; PALETTE_COLORS],
}

/// Decode the palette region into runs of four. A trailing run of fewer
/// than four entries is dropped, never zero-padded.
pub fn decode(view: &BufView<'_>) -> Result<Vec<Palette>, SchemaError> {
    let entries = view.len() / 2;
    let runs = entries / PALETTE_COLORS;

    let mut palettes = Vec::with_capacity(runs);
    for run in 0..runs {
        let mut colors = [Color { alpha: false, r: 0, g: 0, b: 0 }; PALETTE_COLORS];
        for (slot, color) in colors.iter_mut().enumerate() {
            let i = (run * PALETTE_COLORS + slot) * 2;
            *color = Color::from_word(view.get_u16(i).map_err(local)?);
        }
        palettes.push(Palette { colors });
    }
    Ok(palettes)
}

pub fn encode(palettes: &[Palette], out: &mut BufWriter) {
    for palette in palettes {
        for color in &palette.colors {
            out.put_u16(color.to_word());
        }
    }
}
