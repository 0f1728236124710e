//! Copy-on-write edit sessions over a decoded image.
//!
//! Readers clone an `Arc` snapshot and are never invalidated mid-read;
//! writers are serialized and swap in a fully re-encoded snapshot or
//! nothing at all.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::card::{self, Card};
use crate::data::DataPack;
use crate::error::{Error, Result, StructuralError};
use crate::firmware::{self, Firmware};
use crate::schema::BinShape;
use crate::sprite::SpritePack;
use crate::text::CharTable;

/// One decoded image: a card or a firmware dump.
#[derive(Debug)]
pub enum BinImage {
    Card(Card),
    Firmware(Firmware),
}

impl BinImage {
    pub fn shape(&self) -> BinShape {
        match self {
            Self::Card(_) => BinShape::Card,
            Self::Firmware(_) => BinShape::Firmware,
        }
    }

    pub fn data_pack(&self) -> Option<&DataPack> {
        match self {
            Self::Card(card) => card.data_pack.as_ref(),
            Self::Firmware(fw) => fw.data_pack.as_ref(),
        }
    }

    pub fn sprite_pack(&self) -> Option<&SpritePack> {
        match self {
            Self::Card(card) => card.sprite_pack.as_ref(),
            Self::Firmware(fw) => fw.sprite_pack.as_ref(),
        }
    }
}

/// An immutable decoded state plus the exact buffer it decodes from.
#[derive(Debug)]
pub struct Snapshot {
    pub buffer: Vec<u8>,
    pub image: BinImage,
}

/// Detect the image shape and decode one snapshot.
pub fn decode_image(buffer: Vec<u8>, chars: &CharTable) -> Result<Snapshot> {
    let image = if firmware::is_firmware(&buffer) {
        BinImage::Firmware(firmware::read_firmware(&buffer, chars)?)
    } else {
        BinImage::Card(card::read_card(&buffer, chars)?)
    };
    Ok(Snapshot { buffer, image })
}

/// Edit session. Any number of readers hold snapshots concurrently; at
/// most one edit-to-commit transition runs at a time.
pub struct Session {
    chars: Mutex<Arc<CharTable>>,
    current: Mutex<Arc<Snapshot>>,
    /// Serializes writers across the whole commit, not just the swap.
    writer: Mutex<()>,
}

impl Session {
    pub fn open(buffer: Vec<u8>, chars: CharTable) -> Result<Self> {
        let snapshot = decode_image(buffer, &chars)?;
        Ok(Self {
            chars: Mutex::new(Arc::new(chars)),
            current: Mutex::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    /// The current immutable snapshot. Holding it never blocks writers;
    /// it simply keeps observing the state it was taken from.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.lock().clone()
    }

    pub fn char_table(&self) -> Arc<CharTable> {
        self.chars.lock().clone()
    }

    /// Apply an edit and commit it: both packs are cloned, edited,
    /// re-encoded bottom-up and re-decoded into a fresh snapshot, which is
    /// swapped in atomically. Any failure leaves the prior snapshot
    /// current.
    pub fn commit<F>(&self, edit: F) -> Result<Arc<Snapshot>>
    where
        F: FnOnce(&mut DataPack, &mut SpritePack) -> Result<()>,
    {
        let _writing = self.writer.lock();
        let prior = self.snapshot();
        let chars = self.char_table();

        let mut data_pack = prior
            .image
            .data_pack()
            .cloned()
            .ok_or(StructuralError::PackageMissing { index: 0 })?;
        let mut sprite_pack = prior
            .image
            .sprite_pack()
            .cloned()
            .ok_or(StructuralError::PackageMissing { index: 1 })?;

        edit(&mut data_pack, &mut sprite_pack)?;

        let buffer = match &prior.image {
            BinImage::Card(card) => {
                card::write_card(&prior.buffer, &card.archive, &data_pack, &sprite_pack)?
            }
            BinImage::Firmware(_) => {
                firmware::write_firmware(&prior.buffer, &data_pack, &sprite_pack)?
            }
        };

        let snapshot = Arc::new(decode_image(buffer, &chars)?);
        *self.current.lock() = snapshot.clone();
        debug!("commit swapped in a new snapshot");
        Ok(snapshot)
    }

    /// Replace the active character table. The import is validated against
    /// every codepoint in use; on success all text re-renders.
    pub fn import_char_table(&self, candidate: CharTable) -> Result<()> {
        let _writing = self.writer.lock();
        let prior = self.snapshot();

        let in_use = prior
            .image
            .data_pack()
            .map(|pack| pack.used_codes())
            .unwrap_or_default();
        CharTable::validate_import(&candidate, in_use).map_err(Error::from)?;

        let candidate = Arc::new(candidate);
        *self.chars.lock() = candidate.clone();

        // Re-render decoded text under the new table; bytes are untouched.
        let rerendered = decode_image(prior.buffer.clone(), &candidate)?;
        *self.current.lock() = Arc::new(rerendered);
        Ok(())
    }
}
