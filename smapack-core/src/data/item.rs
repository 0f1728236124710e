use serde::{Deserialize, Serialize};

use crate::data::entity::EntityId;
use crate::data::{put_padded_codes, read_padded_text};
use crate::error::SchemaError;
use crate::schema::{self, local};
use crate::text::{CharTable, StringValue};
use crate::view::{BufView, BufWriter};

pub const ITEM_STRIDE: usize = 42;
/// Words reserved for the embedded item name.
pub const ITEM_NAME_WORDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Meal,
    Snack,
    Toy,
    AccessoryHead,
    AccessoryFace,
    AccessoryBody,
    AccessoryHand,
    Room,
    Game,
    Other(u16),
}

impl ItemKind {
    pub fn from_word(word: u16) -> Self {
        match word {
            0 => Self::Meal,
            1 => Self::Snack,
            2 => Self::Toy,
            3 => Self::AccessoryHead,
            4 => Self::AccessoryFace,
            5 => Self::AccessoryBody,
            6 => Self::AccessoryHand,
            7 => Self::Room,
            8 => Self::Game,
            other => Self::Other(other),
        }
    }

    pub fn to_word(self) -> u16 {
        match self {
            Self::Meal => 0,
            Self::Snack => 1,
            Self::Toy => 2,
            Self::AccessoryHead => 3,
            Self::AccessoryFace => 4,
            Self::AccessoryBody => 5,
            Self::AccessoryHand => 6,
            Self::Room => 7,
            Self::Game => 8,
            Self::Other(other) => other,
        }
    }

    pub fn is_accessory(self) -> bool {
        matches!(
            self,
            Self::AccessoryHead | Self::AccessoryFace | Self::AccessoryBody | Self::AccessoryHand
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameKind {
    Guessing,
    Timing,
    Memory,
    Dodging,
    Shaking,
    Swiping,
    Other(u16),
}

impl GameKind {
    pub fn from_word(word: u16) -> Self {
        match word {
            10 => Self::Guessing,
            11 => Self::Timing,
            12 => Self::Memory,
            13 => Self::Dodging,
            14 => Self::Shaking,
            15 => Self::Swiping,
            other => Self::Other(other),
        }
    }

    pub fn to_word(self) -> u16 {
        match self {
            Self::Guessing => 10,
            Self::Timing => 11,
            Self::Memory => 12,
            Self::Dodging => 13,
            Self::Shaking => 14,
            Self::Swiping => 15,
            Self::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: EntityId,
    pub kind: ItemKind,
    pub name: StringValue,
    pub image_id: Option<EntityId>,
    pub worn_image_id: Option<EntityId>,
    pub close_image_id: Option<EntityId>,
    pub animation_id: Option<EntityId>,
    pub price: u16,
    pub unknown1: u16,
    pub unknown2: u16,
    pub unknown3: u16,
    /// Character unlocked by obtaining the item (non-game items).
    pub unlocked_character: Option<u16>,
    /// Minigame variant (games only; shares the wire word above).
    pub game_kind: Option<GameKind>,
}

pub fn decode(view: &BufView<'_>, table: &CharTable) -> Result<Vec<Item>, SchemaError> {
    let count = schema::check_stride(view.len(), ITEM_STRIDE)?;
    let mut items = Vec::with_capacity(count);

    for rec in 0..count {
        let i = rec * ITEM_STRIDE;
        let kind = ItemKind::from_word(view.get_u16(i + 2).map_err(local)?);
        let last = view.get_u16(i + 40).map_err(local)?;
        let (unlocked_character, game_kind) = if kind == ItemKind::Game {
            (None, Some(GameKind::from_word(last)))
        } else {
            ((last != 0).then_some(last), None)
        };

        items.push(Item {
            id: EntityId::from_word(view.get_u16(i).map_err(local)?),
            kind,
            name: read_padded_text(view, i + 4, ITEM_NAME_WORDS, table)?,
            image_id: EntityId::opt(view.get_u16(i + 24).map_err(local)?),
            worn_image_id: EntityId::opt(view.get_u16(i + 26).map_err(local)?),
            close_image_id: EntityId::opt(view.get_u16(i + 28).map_err(local)?),
            animation_id: EntityId::opt(view.get_u16(i + 30).map_err(local)?),
            price: view.get_u16(i + 32).map_err(local)?,
            unknown1: view.get_u16(i + 34).map_err(local)?,
            unknown2: view.get_u16(i + 36).map_err(local)?,
            unknown3: view.get_u16(i + 38).map_err(local)?,
            unlocked_character,
            game_kind,
        });
    }

    Ok(items)
}

pub fn encode(items: &[Item], out: &mut BufWriter) {
    for item in items {
        out.put_u16(item.id.to_word());
        out.put_u16(item.kind.to_word());
        put_padded_codes(out, &item.name.codes, ITEM_NAME_WORDS);
        out.put_u16(item.image_id.map(|id| id.to_word()).unwrap_or(0));
        out.put_u16(item.worn_image_id.map(|id| id.to_word()).unwrap_or(0));
        out.put_u16(item.close_image_id.map(|id| id.to_word()).unwrap_or(0));
        out.put_u16(item.animation_id.map(|id| id.to_word()).unwrap_or(0));
        out.put_u16(item.price);
        out.put_u16(item.unknown1);
        out.put_u16(item.unknown2);
        out.put_u16(item.unknown3);
        out.put_u16(match (item.kind, item.game_kind, item.unlocked_character) {
            (ItemKind::Game, Some(game), _) => game.to_word(),
            (ItemKind::Game, None, _) => 0,
            (_, _, unlocked) => unlocked.unwrap_or(0),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_record(kind: u16, last: u16) -> Vec<u8> {
        let mut words = vec![0x0007, kind];
        words.extend([0x00CC, 0x00CD, 0, 0, 0, 0, 0, 0, 0, 0]); // name "AB"
        words.extend([0x8101, 0, 0, 0x0002]); // image refs
        words.extend([250, 1, 2, 3]); // price + unknowns
        words.push(last);
        crate::view::words_to_bytes(&words)
    }

    #[test]
    fn round_trip_plain_item() {
        let table = CharTable::japanese();
        let bytes = item_record(1, 12);
        let items = decode(&BufView::new(&bytes), &table).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::Snack);
        assert_eq!(items[0].name.text, "ＡＢ");
        assert_eq!(items[0].image_id.unwrap().card_id, Some(1));
        assert_eq!(items[0].worn_image_id, None);
        assert_eq!(items[0].price, 250);
        assert_eq!(items[0].unlocked_character, Some(12));
        assert_eq!(items[0].game_kind, None);

        let mut out = BufWriter::new();
        encode(&items, &mut out);
        assert_eq!(out.into_bytes(), bytes);
    }

    #[test]
    fn game_item_carries_game_kind() {
        let table = CharTable::japanese();
        let bytes = item_record(8, 13);
        let items = decode(&BufView::new(&bytes), &table).unwrap();
        assert_eq!(items[0].kind, ItemKind::Game);
        assert_eq!(items[0].game_kind, Some(GameKind::Dodging));
        assert_eq!(items[0].unlocked_character, None);

        let mut out = BufWriter::new();
        encode(&items, &mut out);
        assert_eq!(out.into_bytes(), bytes);
    }
}
