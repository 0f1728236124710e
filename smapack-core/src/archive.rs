//! Archive reader/writer: locates the package-table container inside a raw
//! buffer and rebuilds it around resized packages.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StructuralError;
use crate::view::BufView;

type Result<T> = std::result::Result<T, StructuralError>;

/// Archive signature word. It follows an "empty" word (`0x0000` or
/// `0xFFFF`), which is what distinguishes it from payload bytes.
pub const SIGNATURE: u16 = 0x3232;

/// Package holding the data pack.
pub const DATA_PACK_PACKAGE: usize = 0;
/// Package holding the sprite pack.
pub const SPRITE_PACK_PACKAGE: usize = 1;

/// Byte offset of a package's offset field inside the package table.
fn offset_field(index: usize) -> usize {
    8 + 16 * index
}

/// Byte offset of a package's size field inside the package table.
fn size_field(index: usize) -> usize {
    16 + 16 * index
}

/// One package table entry. A zero offset or size marks an absent package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub offset: u32,
    pub size: u32,
}

impl PackageEntry {
    pub fn is_present(&self) -> bool {
        self.offset > 0 && self.size > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    /// Absolute position of the signature word in the containing buffer.
    pub base: usize,
    pub entries: Vec<PackageEntry>,
}

/// Scan for the archive signature in 2-byte steps: an empty word
/// (`0x0000`/`0xFFFF`) immediately followed by the signature word.
pub fn locate(view: &BufView<'_>) -> Result<usize> {
    let mut prev_empty = false;
    let mut i = 0;
    while i + 2 <= view.len() {
        let word = view.get_u16(i)?;
        if word == 0x0000 || word == 0xFFFF {
            prev_empty = true;
        } else if prev_empty && word == SIGNATURE {
            return Ok(i);
        } else {
            prev_empty = false;
        }
        i += 2;
    }
    Err(StructuralError::SignatureNotFound { scanned: view.len() })
}

impl Archive {
    /// Locate and read the archive inside `view` (the whole buffer).
    pub fn read(view: &BufView<'_>) -> Result<Self> {
        let base = locate(view)?;
        Self::read_at(view, base)
    }

    pub fn read_at(view: &BufView<'_>, base: usize) -> Result<Self> {
        let count = view.get_u16(base + 2)? as usize;
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            entries.push(PackageEntry {
                offset: view.get_u32(base + offset_field(i))?,
                size: view.get_u32(base + size_field(i))?,
            });
        }
        debug!(base, packages = count, "archive located");
        Ok(Self { base, entries })
    }

    /// Absolute byte range of a present package.
    pub fn package_range(&self, index: usize) -> Option<std::ops::Range<usize>> {
        let entry = self.entries.get(index)?;
        if !entry.is_present() {
            return None;
        }
        let start = self.base + entry.offset as usize;
        Some(start..start + entry.size as usize)
    }

    /// View of a present package's bytes.
    pub fn package<'a>(&self, view: &BufView<'a>, index: usize) -> Result<BufView<'a>> {
        let range = self
            .package_range(index)
            .ok_or(StructuralError::PackageMissing { index })?;
        view.slice(range.start, range.len())
    }
}

/// Rebuild the buffer with some packages replaced. Each replaced package's
/// size field is rewritten and every byte after it (other packages
/// included) shifts by the size delta, with the shifted packages' offset
/// fields patched to match.
pub fn rebuild(original: &[u8], archive: &Archive, replacements: &[(usize, &[u8])]) -> Result<Vec<u8>> {
    let mut out = original.to_vec();
    let mut entries = archive.entries.clone();

    // Splice from the highest offset down so earlier ranges stay valid.
    let mut order: Vec<usize> = (0..replacements.len()).collect();
    order.sort_by_key(|i| std::cmp::Reverse(entries[replacements[*i].0].offset));

    for i in order {
        let (index, bytes) = replacements[i];
        let entry = *entries.get(index).ok_or(StructuralError::PackageMissing { index })?;
        if !entry.is_present() {
            return Err(StructuralError::PackageMissing { index });
        }

        let start = archive.base + entry.offset as usize;
        out.splice(start..start + entry.size as usize, bytes.iter().copied());

        let delta = bytes.len() as i64 - entry.size as i64;
        for other in entries.iter_mut() {
            if other.is_present() && other.offset > entry.offset {
                let shifted = other.offset as i64 + delta;
                other.offset = to_offset(shifted, out.len())?;
            }
        }
        entries[index].size = to_offset(bytes.len() as i64, out.len())?;
    }

    for (i, entry) in entries.iter().enumerate() {
        patch_u32(&mut out, archive.base + offset_field(i), entry.offset);
        patch_u32(&mut out, archive.base + size_field(i), entry.size);
    }
    Ok(out)
}

fn to_offset(value: i64, total: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| StructuralError::PackageOverflow {
        total: total as u64,
        max: u32::MAX as u64,
    })
}

fn patch_u32(buf: &mut [u8], pos: usize, value: u32) {
    buf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}
