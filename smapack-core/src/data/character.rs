use serde::{Deserialize, Serialize};

use crate::data::entity::EntityId;
use crate::data::{put_padded_codes, read_padded_text};
use crate::error::SchemaError;
use crate::schema::{self, local};
use crate::text::{CharTable, StringValue};
use crate::view::{BufView, BufWriter};

pub const CHARACTER_STRIDE: usize = 96;
pub const CHARACTER_NAME_WORDS: usize = 10;
/// Words reserved for each of the four speech fields.
pub const SPEECH_WORDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CharacterKind {
    Egg,
    Baby,
    Child,
    Teen,
    Adult,
    Npc,
    Other(u16),
}

impl CharacterKind {
    pub fn from_word(word: u16) -> Self {
        match word {
            1 => Self::Egg,
            2 => Self::Baby,
            3 => Self::Child,
            4 => Self::Teen,
            5 => Self::Adult,
            6 => Self::Npc,
            other => Self::Other(other),
        }
    }

    pub fn to_word(self) -> u16 {
        match self {
            Self::Egg => 1,
            Self::Baby => 2,
            Self::Child => 3,
            Self::Teen => 4,
            Self::Adult => 5,
            Self::Npc => 6,
            Self::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: EntityId,
    pub kind: CharacterKind,
    pub name: StringValue,
    pub profile_image_id: EntityId,
    pub icon_image_id: EntityId,
    pub composition_id: EntityId,
    pub unknown1: u16,
    /// Speech fragments substituted into dialog placeholders.
    pub pronoun: StringValue,
    pub statement: StringValue,
    pub question1: StringValue,
    pub question2: StringValue,
    pub unknown2: u16,
    pub unknown3: u16,
    /// Identity on the card the character originally shipped with.
    pub global_id: EntityId,
    pub unknown4: u16,
    pub unknown5: u16,
    pub unknown6: u16,
    pub unknown7: u16,
    pub gender: Gender,
}

pub fn decode(view: &BufView<'_>, table: &CharTable) -> Result<Vec<Character>, SchemaError> {
    let count = schema::check_stride(view.len(), CHARACTER_STRIDE)?;
    let mut characters = Vec::with_capacity(count);

    for rec in 0..count {
        let i = rec * CHARACTER_STRIDE;
        characters.push(Character {
            id: EntityId::from_word(view.get_u16(i).map_err(local)?),
            kind: CharacterKind::from_word(view.get_u16(i + 2).map_err(local)?),
            name: read_padded_text(view, i + 4, CHARACTER_NAME_WORDS, table)?,
            profile_image_id: EntityId::from_word(view.get_u16(i + 24).map_err(local)?),
            icon_image_id: EntityId::from_word(view.get_u16(i + 26).map_err(local)?),
            composition_id: EntityId::from_word(view.get_u16(i + 28).map_err(local)?),
            unknown1: view.get_u16(i + 30).map_err(local)?,
            pronoun: read_padded_text(view, i + 32, SPEECH_WORDS, table)?,
            statement: read_padded_text(view, i + 44, SPEECH_WORDS, table)?,
            question1: read_padded_text(view, i + 56, SPEECH_WORDS, table)?,
            question2: read_padded_text(view, i + 68, SPEECH_WORDS, table)?,
            unknown2: view.get_u16(i + 80).map_err(local)?,
            unknown3: view.get_u16(i + 82).map_err(local)?,
            global_id: EntityId::from_word(view.get_u16(i + 84).map_err(local)?),
            unknown4: view.get_u16(i + 86).map_err(local)?,
            unknown5: view.get_u16(i + 88).map_err(local)?,
            unknown6: view.get_u16(i + 90).map_err(local)?,
            unknown7: view.get_u16(i + 92).map_err(local)?,
            gender: if view.get_u16(i + 94).map_err(local)? == 0 {
                Gender::Female
            } else {
                Gender::Male
            },
        });
    }

    Ok(characters)
}

pub fn encode(characters: &[Character], out: &mut BufWriter) {
    for ch in characters {
        out.put_u16(ch.id.to_word());
        out.put_u16(ch.kind.to_word());
        put_padded_codes(out, &ch.name.codes, CHARACTER_NAME_WORDS);
        out.put_u16(ch.profile_image_id.to_word());
        out.put_u16(ch.icon_image_id.to_word());
        out.put_u16(ch.composition_id.to_word());
        out.put_u16(ch.unknown1);
        put_padded_codes(out, &ch.pronoun.codes, SPEECH_WORDS);
        put_padded_codes(out, &ch.statement.codes, SPEECH_WORDS);
        put_padded_codes(out, &ch.question1.codes, SPEECH_WORDS);
        put_padded_codes(out, &ch.question2.codes, SPEECH_WORDS);
        out.put_u16(ch.unknown2);
        out.put_u16(ch.unknown3);
        out.put_u16(ch.global_id.to_word());
        out.put_u16(ch.unknown4);
        out.put_u16(ch.unknown5);
        out.put_u16(ch.unknown6);
        out.put_u16(ch.unknown7);
        out.put_u16(match ch.gender {
            Gender::Female => 0,
            Gender::Male => 1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let table = CharTable::japanese();
        let mut words = vec![0x8203u16, 5];
        words.extend([0x000F, 0x0010, 0, 0, 0, 0, 0, 0, 0, 0]); // name
        words.extend([0x8204, 0x8205, 0x8206, 0]); // image/composition refs
        words.extend([0x0057, 0x0042, 0, 0, 0, 0]); // pronoun
        words.extend([0x003C, 0x0053, 0x001B, 0, 0, 0]); // statement
        words.extend([0x003C, 0x0053, 0x001B, 0x0014, 0, 0]); // question1
        words.extend([0x0053, 0x001B, 0x0014, 0, 0, 0]); // question2
        words.extend([7, 8, 0x8203, 1, 2, 3, 4, 1]); // trailing words + male
        let bytes = crate::view::words_to_bytes(&words);
        assert_eq!(bytes.len(), CHARACTER_STRIDE);

        let characters = decode(&BufView::new(&bytes), &table).unwrap();
        assert_eq!(characters.len(), 1);
        let ch = &characters[0];
        assert_eq!(ch.id.card_id, Some(2));
        assert_eq!(ch.kind, CharacterKind::Adult);
        assert_eq!(ch.name.text, "あい");
        assert_eq!(ch.gender, Gender::Male);

        let mut out = BufWriter::new();
        encode(&characters, &mut out);
        assert_eq!(out.into_bytes(), bytes);
    }
}
