use byteorder::{ByteOrder, LittleEndian};

use crate::error::StructuralError;

type Result<T> = std::result::Result<T, StructuralError>;

/// Bounds-checked view over a byte range. All reads are little-endian.
///
/// A view remembers the absolute offset of its first byte in the containing
/// buffer so failures report positions a hex editor can find.
#[derive(Clone, Copy)]
pub struct BufView<'a> {
    data: &'a [u8],
    base: usize,
}

impl<'a> BufView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, base: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute offset of this view's first byte.
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Sub-view over `[start, start+len)`, keeping absolute positions.
    pub fn slice(&self, start: usize, len: usize) -> Result<BufView<'a>> {
        self.ensure(start, len)?;
        Ok(BufView {
            data: &self.data[start..start + len],
            base: self.base + start,
        })
    }

    pub fn get_u8(&self, i: usize) -> Result<u8> {
        self.ensure(i, 1)?;
        Ok(self.data[i])
    }

    pub fn get_u16(&self, i: usize) -> Result<u16> {
        self.ensure(i, 2)?;
        Ok(LittleEndian::read_u16(&self.data[i..]))
    }

    pub fn get_i16(&self, i: usize) -> Result<i16> {
        self.ensure(i, 2)?;
        Ok(LittleEndian::read_i16(&self.data[i..]))
    }

    pub fn get_u32(&self, i: usize) -> Result<u32> {
        self.ensure(i, 4)?;
        Ok(LittleEndian::read_u32(&self.data[i..]))
    }

    /// The whole view as 16-bit words. A trailing odd byte is an error.
    pub fn words(&self) -> Result<Vec<u16>> {
        if self.data.len() % 2 != 0 {
            return Err(StructuralError::Truncated {
                offset: self.base + self.data.len() - 1,
                need: 2,
                have: 1,
            });
        }
        let mut words = vec![0u16; self.data.len() / 2];
        LittleEndian::read_u16_into(self.data, &mut words);
        Ok(words)
    }

    fn ensure(&self, i: usize, need: usize) -> Result<()> {
        if i.checked_add(need).is_none_or(|end| end > self.data.len()) {
            return Err(StructuralError::Truncated {
                offset: self.base + i,
                need,
                have: self.data.len().saturating_sub(i),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for BufView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufView")
            .field("base", &format_args!("{:#x}", self.base))
            .field("len", &self.data.len())
            .finish()
    }
}

/// Growable little-endian byte builder with size backpatching.
#[derive(Default)]
pub struct BufWriter {
    buf: Vec<u8>,
}

impl BufWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_words(&mut self, words: &[u16]) {
        for w in words {
            self.put_u16(*w);
        }
    }

    /// Overwrite a previously written u32 (offset/size backpatching).
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Zero-pad until the length is a multiple of `align`.
    pub fn align(&mut self, align: usize) {
        while self.buf.len() % align != 0 {
            self.buf.push(0);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for w in words {
        bytes.extend_from_slice(&w.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_are_little_endian_and_bounded() {
        let view = BufView::new(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(view.get_u16(0).unwrap(), 0x0201);
        assert_eq!(view.get_u32(0).unwrap(), 0x04030201);
        let err = view.get_u32(2).unwrap_err();
        match err {
            StructuralError::Truncated { offset, need, have } => {
                assert_eq!((offset, need, have), (2, 4, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn slices_keep_absolute_offsets() {
        let data = [0u8; 16];
        let view = BufView::new(&data);
        let sub = view.slice(8, 4).unwrap();
        assert_eq!(sub.base(), 8);
        let err = sub.get_u16(3).unwrap_err();
        match err {
            StructuralError::Truncated { offset, .. } => assert_eq!(offset, 11),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn writer_backpatch_and_align() {
        let mut w = BufWriter::new();
        w.put_u32(0);
        w.put_u16(0xBEEF);
        w.align(4);
        w.patch_u32(0, w.len() as u32);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![8, 0, 0, 0, 0xEF, 0xBE, 0, 0]);
    }
}
