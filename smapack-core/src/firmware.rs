//! Firmware image shape: a leading ASCII signature and fixed absolute
//! regions instead of a scanned archive.

use tracing::debug;

use crate::data::{self, DataPack};
use crate::error::{Error, Result, StructuralError, TableFault};
use crate::schema::BinShape;
use crate::sprite::SpritePack;
use crate::text::CharTable;
use crate::view::BufView;

/// Leading ASCII signature of a firmware dump.
pub const SIGNATURE: &[u8] = b"GP-SPIF-HEADER";

/// Fixed absolute region bounds.
pub const DATA_PACK_START: usize = 0x6CE000;
pub const SPRITE_PACK_START: usize = 0x730000;

/// Probe for the known incompatible hardware variant: erased flash at the
/// data-pack region start means the image uses a different layout and is
/// refused up front instead of mis-decoded.
pub const VARIANT_PROBE: usize = DATA_PACK_START;
pub const VARIANT_MARKER: u16 = 0xFFFF;

pub fn is_firmware(buf: &[u8]) -> bool {
    buf.starts_with(SIGNATURE)
}

#[derive(Debug)]
pub struct Firmware {
    pub data_pack: Option<DataPack>,
    pub sprite_pack: Option<SpritePack>,
    pub faults: Vec<TableFault>,
    pub pack_errors: Vec<(usize, Error)>,
}

pub fn read_firmware(buf: &[u8], chars: &CharTable) -> Result<Firmware> {
    let view = BufView::new(buf);
    if view.len() < SPRITE_PACK_START {
        return Err(StructuralError::Truncated {
            offset: 0,
            need: SPRITE_PACK_START,
            have: view.len(),
        }
        .into());
    }
    let marker = view.get_u16(VARIANT_PROBE).map_err(Error::from)?;
    if marker == VARIANT_MARKER {
        return Err(StructuralError::IncompatibleVariant { probe: VARIANT_PROBE, marker }.into());
    }

    let mut firmware = Firmware {
        data_pack: None,
        sprite_pack: None,
        faults: Vec::new(),
        pack_errors: Vec::new(),
    };

    let data_region = view
        .slice(DATA_PACK_START, SPRITE_PACK_START - DATA_PACK_START)
        .map_err(Error::from)?;
    match data::decode(&data_region, BinShape::Firmware, chars) {
        Ok((pack, mut faults)) => {
            firmware.data_pack = Some(pack);
            firmware.faults.append(&mut faults);
        }
        Err(error) => firmware.pack_errors.push((0, error)),
    }

    let sprite_region = view
        .slice(SPRITE_PACK_START, view.len() - SPRITE_PACK_START)
        .map_err(Error::from)?;
    match SpritePack::decode(&sprite_region) {
        Ok(pack) => firmware.sprite_pack = Some(pack),
        Err(error) => firmware.pack_errors.push((1, error)),
    }

    debug!(
        data = firmware.data_pack.is_some(),
        sprite = firmware.sprite_pack.is_some(),
        "firmware decoded"
    );
    Ok(firmware)
}

/// Re-encode both packs into a new firmware buffer. Regions are fixed, so
/// a pack that outgrows its region is refused; a shorter one is
/// zero-padded to the region boundary.
pub fn write_firmware(
    original: &[u8],
    data_pack: &DataPack,
    sprite_pack: &SpritePack,
) -> Result<Vec<u8>> {
    let mut out = original.to_vec();
    let data_bytes = data_pack.encode()?;
    patch_region(&mut out, DATA_PACK_START, SPRITE_PACK_START, &data_bytes)?;
    let sprite_bytes = sprite_pack.encode()?;
    let end = out.len();
    patch_region(&mut out, SPRITE_PACK_START, end, &sprite_bytes)?;
    Ok(out)
}

fn patch_region(out: &mut [u8], start: usize, end: usize, bytes: &[u8]) -> Result<()> {
    let room = end - start;
    if bytes.len() > room {
        return Err(StructuralError::PackageOverflow {
            total: bytes.len() as u64,
            max: room as u64,
        }
        .into());
    }
    out[start..start + bytes.len()].copy_from_slice(bytes);
    out[start + bytes.len()..end].fill(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_detection() {
        assert!(is_firmware(b"GP-SPIF-HEADER rest"));
        assert!(!is_firmware(b"something else"));
    }

    #[test]
    fn erased_data_region_is_the_incompatible_variant() {
        let mut buf = vec![0u8; SPRITE_PACK_START + 16];
        buf[..SIGNATURE.len()].copy_from_slice(SIGNATURE);
        buf[VARIANT_PROBE] = 0xFF;
        buf[VARIANT_PROBE + 1] = 0xFF;
        let err = read_firmware(&buf, &CharTable::japanese()).unwrap_err();
        assert!(matches!(
            err,
            Error::Structural(StructuralError::IncompatibleVariant { marker: 0xFFFF, .. })
        ));
    }

    #[test]
    fn oversized_pack_is_refused() {
        let mut out = vec![0u8; 8];
        let err = patch_region(&mut out, 0, 4, &[1, 2, 3, 4, 5]).unwrap_err();
        assert!(matches!(
            err,
            Error::Structural(StructuralError::PackageOverflow { total: 5, max: 4 })
        ));
        patch_region(&mut out, 0, 4, &[9, 9]).unwrap();
        assert_eq!(out, vec![9, 9, 0, 0, 0, 0, 0, 0]);
    }
}
