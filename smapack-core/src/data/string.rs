use serde::{Deserialize, Serialize};

use crate::data::entity::EntityId;
use crate::error::SchemaError;
use crate::schema::{GROUP_SENTINEL, local};
use crate::text::{CharTable, StringValue};
use crate::view::{BufView, BufWriter};

/// Fixed header words before the codepoints: id + three unknown words.
const HEADER_BYTES: usize = 8;

/// One dialog string record. The text is null-terminated on the wire, so
/// record length is derived from the terminator, not a stride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogString {
    pub id: EntityId,
    pub unknown1: u16,
    pub unknown2: u16,
    pub unknown3: u16,
    pub value: StringValue,
}

impl DialogString {
    /// Record length on the wire: header + codepoints + terminator.
    pub fn wire_len(&self) -> usize {
        HEADER_BYTES + 2 * (self.value.codes.len() + 1)
    }
}

pub fn decode(view: &BufView<'_>, table: &CharTable) -> Result<Vec<DialogString>, SchemaError> {
    let mut strings = Vec::new();

    let mut i = 0;
    // Smallest possible record: header plus a lone terminator.
    while i + HEADER_BYTES + 2 <= view.len() {
        let id = EntityId::from_word(view.get_u16(i).map_err(local)?);
        let unknown1 = view.get_u16(i + 2).map_err(local)?;
        let unknown2 = view.get_u16(i + 4).map_err(local)?;
        let unknown3 = view.get_u16(i + 6).map_err(local)?;

        let mut codes = Vec::new();
        let mut pos = i + HEADER_BYTES;
        while pos + 2 <= view.len() {
            let word = view.get_u16(pos).map_err(local)?;
            pos += 2;
            if word == 0 {
                break;
            }
            codes.push(word);
        }
        i = pos;

        strings.push(DialogString {
            id,
            unknown1,
            unknown2,
            unknown3,
            value: StringValue::from_codes(table, codes),
        });
    }

    Ok(strings)
}

/// Encode the records plus the sibling word-offset index (one entry per
/// record, terminated by the sentinel).
pub fn encode(strings: &[DialogString], records: &mut BufWriter, offsets: &mut BufWriter) {
    let mut word_pos = 0u16;
    for string in strings {
        offsets.put_u16(word_pos);
        records.put_u16(string.id.to_word());
        records.put_u16(string.unknown1);
        records.put_u16(string.unknown2);
        records.put_u16(string.unknown3);
        records.put_words(&string.value.codes);
        records.put_u16(0);
        word_pos += (string.wire_len() / 2) as u16;
    }
    offsets.put_u16(GROUP_SENTINEL);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_one_record() {
        // {entity_id=5, flags=(0,0,0), text="AB"} + terminator.
        let table = CharTable::japanese();
        let mut bytes = Vec::new();
        for w in [0x0005u16, 0, 0, 0, 0x00CC, 0x00CD, 0] {
            bytes.extend_from_slice(&w.to_le_bytes());
        }

        let strings = decode(&BufView::new(&bytes), &table).unwrap();
        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].id.entity_id, 5);
        assert_eq!(strings[0].id.card_id, None);
        assert_eq!(strings[0].value.text, "ＡＢ");
        assert_eq!(strings[0].wire_len(), 14);

        let mut records = BufWriter::new();
        let mut offsets = BufWriter::new();
        encode(&strings, &mut records, &mut offsets);
        assert_eq!(records.into_bytes(), bytes);
        assert_eq!(offsets.into_bytes(), vec![0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn consecutive_records_split_on_terminator() {
        let table = CharTable::japanese();
        let mut bytes = Vec::new();
        for w in [1u16, 0, 0, 0, 0x0002, 0, 2, 9, 9, 9, 0x0003, 0x0004, 0] {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let strings = decode(&BufView::new(&bytes), &table).unwrap();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings[0].value.codes, vec![0x0002]);
        assert_eq!(strings[1].id.entity_id, 2);
        assert_eq!((strings[1].unknown1, strings[1].unknown2, strings[1].unknown3), (9, 9, 9));
        assert_eq!(strings[1].value.codes, vec![0x0003, 0x0004]);

        let mut records = BufWriter::new();
        let mut offsets = BufWriter::new();
        encode(&strings, &mut records, &mut offsets);
        assert_eq!(records.into_bytes(), bytes);
        // Second record starts at word 7.
        assert_eq!(offsets.into_bytes(), vec![0, 0, 7, 0, 0xFF, 0xFF]);
    }
}
