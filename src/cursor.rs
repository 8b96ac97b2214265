use crate::error::{Error, Result};
use crate::tag::Tag;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Byte order of every length field in a document. Decided once, by the root tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    pub fn write_u32(self, buf: &mut [u8], v: u32) {
        match self {
            Endian::Little => LittleEndian::write_u32(buf, v),
            Endian::Big => BigEndian::write_u32(buf, v),
        }
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        let mut out = [0u8; 4];
        self.write_u32(&mut out, v);
        out
    }
}

/// Forward-only reader over a byte slice.
///
/// `base` is the absolute offset of `data[0]` within whatever stream the slice was cut from, so
/// sub-cursors over a list's content region still report positions in terms of the whole input.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    endian: Endian,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
            endian,
        }
    }

    /// Current absolute position.
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Absolute position of the first byte this cursor can see.
    pub fn start(&self) -> usize {
        self.base
    }

    /// Total length of the underlying slice.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Everything not yet consumed, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    /// Read `n` bytes without copying.
    pub fn read_bytes(&mut self, n: usize, step: &'static str) -> Result<&'a [u8]> {
        self.ensure(n, step)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_tag(&mut self, step: &'static str) -> Result<Tag> {
        let bytes = self.read_bytes(4, step)?;
        let mut tag = [0u8; 4];
        tag.copy_from_slice(bytes);
        Ok(Tag(tag))
    }

    /// Read a 32-bit field in the document's byte order.
    pub fn read_u32(&mut self, step: &'static str) -> Result<u32> {
        let bytes = self.read_bytes(4, step)?;
        Ok(self.endian.read_u32(bytes))
    }

    /// Split off the next `n` bytes as their own cursor, advancing past them.
    pub fn sub(&mut self, n: usize, step: &'static str) -> Result<ByteCursor<'a>> {
        let start = self.position();
        let data = self.read_bytes(n, step)?;
        Ok(ByteCursor {
            data,
            pos: 0,
            base: start,
            endian: self.endian,
        })
    }

    fn ensure(&self, n: usize, step: &'static str) -> Result<()> {
        if n > self.remaining() {
            return Err(Error::UnexpectedEof {
                step,
                offset: self.position(),
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_advance() {
        let data = b"abcd\x04\x00\x00\x001234";
        let mut cur = ByteCursor::new(data, Endian::Little);
        assert_eq!(cur.read_tag("tag").unwrap(), Tag::new(b"abcd"));
        assert_eq!(cur.read_u32("len").unwrap(), 4);
        assert_eq!(cur.position(), 8);
        assert_eq!(cur.read_bytes(4, "body").unwrap(), b"1234");
        assert!(cur.is_empty());
    }

    #[test]
    fn big_endian() {
        let mut cur = ByteCursor::new(&[0, 0, 1, 2], Endian::Big);
        assert_eq!(cur.read_u32("len").unwrap(), 0x0102);
    }

    #[test]
    fn eof_reports_position() {
        let mut cur = ByteCursor::new(b"abcdef", Endian::Little);
        cur.read_bytes(4, "tag").unwrap();
        match cur.read_u32("len") {
            Err(Error::UnexpectedEof {
                step,
                offset,
                need,
                have,
            }) => {
                assert_eq!(step, "len");
                assert_eq!(offset, 4);
                assert_eq!(need, 4);
                assert_eq!(have, 2);
            }
            other => panic!("Expected UnexpectedEof, got {:?}", other),
        }
        // A failed read doesn't move the cursor
        assert_eq!(cur.position(), 4);
    }

    #[test]
    fn sub_cursor_keeps_absolute_offsets() {
        let data = b"xxxxabcdefgh";
        let mut cur = ByteCursor::new(data, Endian::Little);
        cur.read_bytes(4, "skip").unwrap();
        let mut sub = cur.sub(6, "region").unwrap();
        assert_eq!(sub.start(), 4);
        assert_eq!(sub.len(), 6);
        sub.read_bytes(2, "a").unwrap();
        assert_eq!(sub.position(), 6);
        assert_eq!(sub.rest(), b"cdef");
        assert_eq!(cur.position(), 10);
        assert!(sub.read_bytes(5, "too far").is_err());
    }
}
