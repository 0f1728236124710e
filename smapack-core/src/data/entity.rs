use serde::{Deserialize, Serialize};

use crate::error::ReferenceError;

/// A cross-table reference: a row id, optionally qualified by the id of
/// the card that owns the row.
///
/// Wire form is one word. Bit 15 marks a card-qualified reference with the
/// card id in bits 8..15 and the row id in the low byte; otherwise the low
/// 15 bits are a row id local to the current container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityId {
    pub card_id: Option<u16>,
    pub entity_id: u16,
}

impl EntityId {
    pub fn from_word(word: u16) -> Self {
        if word >> 15 != 0 {
            Self {
                card_id: Some((word >> 8) & 0x7f),
                entity_id: word & 0xff,
            }
        } else {
            Self { card_id: None, entity_id: word & 0x7fff }
        }
    }

    /// A reference is present only for a non-zero word.
    pub fn opt(word: u16) -> Option<Self> {
        (word != 0).then(|| Self::from_word(word))
    }

    pub fn to_word(&self) -> u16 {
        match self.card_id {
            Some(card) => 0x8000 | (card & 0x7f) << 8 | (self.entity_id & 0xff),
            None => self.entity_id & 0x7fff,
        }
    }

    /// Rewrite the card qualifier when records move between cards.
    pub fn rebase_card(&mut self, old_card_id: u16, new_card_id: u16) {
        if self.card_id == Some(old_card_id) {
            self.card_id = Some(new_card_id);
        }
    }

    /// Check that the row id lands inside the referenced table.
    pub fn validate_row(&self, rows: usize) -> Result<(), ReferenceError> {
        if (self.entity_id as usize) < rows {
            Ok(())
        } else {
            Err(ReferenceError::DanglingEntity { entity: self.entity_id, rows })
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.card_id {
            Some(card) => write!(f, "{card}:{}", self.entity_id),
            None => write!(f, "{}", self.entity_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_and_card_forms() {
        let local = EntityId::from_word(0x0123);
        assert_eq!(local, EntityId { card_id: None, entity_id: 0x123 });
        assert_eq!(local.to_word(), 0x0123);

        let carded = EntityId::from_word(0x8512);
        assert_eq!(carded, EntityId { card_id: Some(5), entity_id: 0x12 });
        assert_eq!(carded.to_word(), 0x8512);
    }

    #[test]
    fn zero_word_is_absent() {
        assert_eq!(EntityId::opt(0), None);
        assert!(EntityId::opt(1).is_some());
    }

    #[test]
    fn row_validation() {
        let id = EntityId { card_id: None, entity_id: 4 };
        assert!(id.validate_row(5).is_ok());
        assert_eq!(
            id.validate_row(4),
            Err(ReferenceError::DanglingEntity { entity: 4, rows: 4 })
        );
    }
}
