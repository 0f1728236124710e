//! Card image shape: an 80-byte fixed header followed (at the first
//! sector boundary) by the signature-delimited archive.

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::archive::{self, Archive, DATA_PACK_PACKAGE, SPRITE_PACK_PACKAGE};
use crate::data::{self, DataPack};
use crate::error::{Error, Result, StructuralError, TableFault};
use crate::schema::BinShape;
use crate::sprite::SpritePack;
use crate::text::CharTable;
use crate::view::BufView;

/// Wire layout of the card header. Unknown words round-trip verbatim.
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct RawHeader {
    pub sector_count: u16,
    pub checksum: u16,
    pub device_ids: [u32; 3],
    pub vendor_id: [u8; 16],
    pub product_id: [u8; 16],
    pub card_type: u16,
    pub card_id: u16,
    pub unknown1: u16,
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub revision: u16,
    pub unknown2: u16,
    pub md5: [u8; 16],
}

static_assertions::assert_eq_size!(RawHeader, [u8; 80]);

impl RawHeader {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn read(view: &BufView<'_>) -> Result<Self> {
        if view.len() < Self::SIZE {
            return Err(StructuralError::Truncated {
                offset: view.base(),
                need: Self::SIZE,
                have: view.len(),
            }
            .into());
        }
        Ok(Self::read_from_bytes(&view.bytes()[..Self::SIZE]).expect("size checked above"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    TamaSmaCard,
    PromoTreasure,
    PromoItem,
    Other(u16),
}

impl CardType {
    pub fn from_word(word: u16) -> Self {
        match word {
            0 => Self::TamaSmaCard,
            1 => Self::PromoTreasure,
            2 => Self::PromoItem,
            other => Self::Other(other),
        }
    }
}

/// Decoded card header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardHeader {
    pub sector_count: u16,
    pub checksum: u16,
    pub device_ids: [u32; 3],
    pub vendor_id: [u8; 16],
    pub product_id: [u8; 16],
    pub card_type: CardType,
    pub card_id: u16,
    pub unknown1: u16,
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub revision: u16,
    pub unknown2: u16,
    pub md5: [u8; 16],
}

impl CardHeader {
    /// ASCII label, trailing NULs and spaces trimmed.
    pub fn vendor(&self) -> String {
        label(&self.vendor_id)
    }

    pub fn product(&self) -> String {
        label(&self.product_id)
    }

    pub fn md5_hex(&self) -> String {
        self.md5.iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn label(bytes: &[u8]) -> String {
    let text: String = bytes.iter().map(|b| *b as char).collect();
    text.trim_end_matches(['\0', ' ']).to_string()
}

impl From<RawHeader> for CardHeader {
    fn from(raw: RawHeader) -> Self {
        Self {
            sector_count: raw.sector_count,
            checksum: raw.checksum,
            device_ids: raw.device_ids,
            vendor_id: raw.vendor_id,
            product_id: raw.product_id,
            card_type: CardType::from_word(raw.card_type),
            card_id: raw.card_id,
            unknown1: raw.unknown1,
            year: raw.year,
            month: raw.month,
            day: raw.day,
            revision: raw.revision,
            unknown2: raw.unknown2,
            md5: raw.md5,
        }
    }
}

/// A fully decoded card image. The packs decode independently: a failure
/// in one leaves the other inspectable, recorded in `pack_errors`.
#[derive(Debug)]
pub struct Card {
    pub header: CardHeader,
    pub archive: Archive,
    pub data_pack: Option<DataPack>,
    pub sprite_pack: Option<SpritePack>,
    pub faults: Vec<TableFault>,
    pub pack_errors: Vec<(usize, Error)>,
}

pub fn read_card(buf: &[u8], chars: &CharTable) -> Result<Card> {
    let view = BufView::new(buf);
    let header = CardHeader::from(RawHeader::read(&view)?);
    let arch = Archive::read(&view)?;

    let mut data_pack = None;
    let mut sprite_pack = None;
    let mut faults = Vec::new();
    let mut pack_errors = Vec::new();

    match arch
        .package(&view, DATA_PACK_PACKAGE)
        .map_err(Error::from)
        .and_then(|pack| data::decode(&pack, BinShape::Card, chars))
    {
        Ok((pack, mut pack_faults)) => {
            data_pack = Some(pack);
            faults.append(&mut pack_faults);
        }
        Err(error) => pack_errors.push((DATA_PACK_PACKAGE, error)),
    }

    match arch
        .package(&view, SPRITE_PACK_PACKAGE)
        .map_err(Error::from)
        .and_then(|pack| SpritePack::decode(&pack))
    {
        Ok(pack) => sprite_pack = Some(pack),
        Err(error) => pack_errors.push((SPRITE_PACK_PACKAGE, error)),
    }

    Ok(Card { header, archive: arch, data_pack, sprite_pack, faults, pack_errors })
}

/// Re-encode both packs into a new card buffer. The output is
/// byte-identical to `original` outside the re-encoded packages and the
/// package table fields their new sizes flow into.
pub fn write_card(
    original: &[u8],
    arch: &Archive,
    data_pack: &DataPack,
    sprite_pack: &SpritePack,
) -> Result<Vec<u8>> {
    let data_bytes = data_pack.encode()?;
    let sprite_bytes = sprite_pack.encode()?;
    let replacements: [(usize, &[u8]); 2] = [
        (DATA_PACK_PACKAGE, &data_bytes),
        (SPRITE_PACK_PACKAGE, &sprite_bytes),
    ];
    Ok(archive::rebuild(original, arch, &replacements)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_at_documented_offsets() {
        let mut bytes = vec![0u8; RawHeader::SIZE];
        bytes[0..2].copy_from_slice(&0x0040u16.to_le_bytes()); // sector count
        bytes[16..20].copy_from_slice(b"TAMA");
        bytes[48..50].copy_from_slice(&0u16.to_le_bytes()); // card type
        bytes[50..52].copy_from_slice(&5u16.to_le_bytes()); // card id
        bytes[54..56].copy_from_slice(&2021u16.to_le_bytes()); // year
        bytes[64] = 0xAB; // first md5 byte

        let header = CardHeader::from(RawHeader::read(&BufView::new(&bytes)).unwrap());
        assert_eq!(header.sector_count, 0x0040);
        assert_eq!(header.vendor(), "TAMA");
        assert_eq!(header.card_type, CardType::TamaSmaCard);
        assert_eq!(header.card_id, 5);
        assert_eq!(header.year, 2021);
        assert!(header.md5_hex().starts_with("ab"));
    }

    #[test]
    fn short_buffer_is_structural() {
        let err = RawHeader::read(&BufView::new(&[0u8; 60])).unwrap_err();
        assert!(matches!(
            err,
            Error::Structural(StructuralError::Truncated { need: 80, have: 60, .. })
        ));
    }
}
