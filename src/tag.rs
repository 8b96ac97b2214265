use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

/// A 4-byte chunk identifier.
///
/// Tags are ASCII-ish but not guaranteed to be printable, so they're stored as raw bytes. Tags
/// shorter than 4 characters are space padded on disk (`"doc "`, `"obj "`), and that padding is
/// part of the tag.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Root list tag for little-endian files.
    pub const RIFF: Tag = Tag(*b"RIFF");
    /// Root list tag for big-endian files.
    pub const RIFX: Tag = Tag(*b"RIFX");
    /// Nested list tag.
    pub const LIST: Tag = Tag(*b"LIST");
    /// Reserved list sub-tag marking a block-indexed compressed list.
    pub const CMPR: Tag = Tag(*b"cmpr");
    /// Object tag used for packed (zlib) object streams.
    pub const PACK: Tag = Tag(*b"pack");
    /// Placeholder tag for raw bytes that have no header of their own.
    pub const OPAQUE: Tag = Tag(*b"????");

    pub const fn new(bytes: &[u8; 4]) -> Self {
        Tag(*bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True for the tags that carry a sub-tag and may have children.
    pub fn is_list(&self) -> bool {
        *self == Tag::LIST || self.is_root()
    }

    pub fn is_root(&self) -> bool {
        *self == Tag::RIFF || *self == Tag::RIFX
    }

    /// Objects must start with three ASCII alphanumeric bytes. Anything else means there's no
    /// object at this position.
    pub fn is_object_tag(&self) -> bool {
        self.0[..3].iter().all(|b| b.is_ascii_alphanumeric())
    }
}

impl From<[u8; 4]> for Tag {
    fn from(v: [u8; 4]) -> Self {
        Tag(v)
    }
}

impl TryFrom<&[u8]> for Tag {
    type Error = usize;
    fn try_from(v: &[u8]) -> Result<Tag, usize> {
        <[u8; 4]>::try_from(v).map(Tag).map_err(|_| v.len())
    }
}

impl TryFrom<String> for Tag {
    type Error = String;
    fn try_from(v: String) -> Result<Tag, String> {
        Tag::try_from(v.as_bytes())
            .map_err(|len| format!("Tag {:?} must be exactly 4 bytes, got {}", v, len))
    }
}

impl From<Tag> for String {
    fn from(v: Tag) -> String {
        v.to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0.iter() {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(\"{}\")", self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn object_tags() {
        assert!(Tag::new(b"abcd").is_object_tag());
        assert!(Tag::new(b"doc ").is_object_tag());
        assert!(Tag::new(b"bmp\0").is_object_tag());
        assert!(!Tag::new(b"ab\0d").is_object_tag());
        assert!(!Tag::new(b" abc").is_object_tag());
        assert!(!Tag::new(&[0xff, 0xfe, 0x00, 0x01]).is_object_tag());
    }

    #[test]
    fn list_tags() {
        assert!(Tag::LIST.is_list());
        assert!(Tag::RIFF.is_list());
        assert!(Tag::RIFX.is_root());
        assert!(!Tag::PACK.is_list());
        assert!(!Tag::CMPR.is_list());
    }

    #[test]
    fn display_escapes() {
        assert_eq!(Tag::new(b"grp ").to_string(), "grp ");
        assert_eq!(Tag::new(b"ab\x01d").to_string(), "ab\\x01d");
    }

    #[test]
    fn from_string() {
        assert_eq!(Tag::try_from(String::from("page")), Ok(Tag::new(b"page")));
        assert!(Tag::try_from(String::from("pages")).is_err());
    }
}
