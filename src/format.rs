//! Format identification and document-wide context.
//!
//! Some facts about a document are only stated once, at the root: the byte order (`RIFF` vs.
//! `RIFX`), the format version (the root's sub-tag), and for CMX files the coordinate size in the
//! `cont` chunk. Nodes deeper in the tree find them by walking back up to the root.

use crate::cursor::Endian;
use crate::tag::Tag;

/// The version tag carried in the root list's sub-tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    Cdr5,
    Cdr6,
    Cdr7,
    Cdr8,
    Cdr9,
    Cdr10,
    Cdr11,
    Cdr12,
    Cdr13,
    Cmx1,
    /// Any other sub-tag. Still parseable as a generic container.
    Other(Tag),
}

impl FormatVersion {
    pub fn from_tag(tag: Tag) -> Self {
        use self::FormatVersion::*;
        match tag.as_bytes() {
            b"CDR5" => Cdr5,
            b"CDR6" => Cdr6,
            b"CDR7" => Cdr7,
            b"CDR8" => Cdr8,
            b"CDR9" => Cdr9,
            b"CDRA" => Cdr10,
            b"CDRB" => Cdr11,
            b"CDRC" => Cdr12,
            b"CDRD" => Cdr13,
            b"CMX1" => Cmx1,
            _ => Other(tag),
        }
    }

    pub fn tag(&self) -> Tag {
        use self::FormatVersion::*;
        Tag::new(match self {
            Cdr5 => b"CDR5",
            Cdr6 => b"CDR6",
            Cdr7 => b"CDR7",
            Cdr8 => b"CDR8",
            Cdr9 => b"CDR9",
            Cdr10 => b"CDRA",
            Cdr11 => b"CDRB",
            Cdr12 => b"CDRC",
            Cdr13 => b"CDRD",
            Cmx1 => b"CMX1",
            Other(tag) => return *tag,
        })
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, FormatVersion::Other(_))
    }

    pub fn is_cdr(&self) -> bool {
        self.is_known() && *self != FormatVersion::Cmx1
    }
}

/// Width of the coordinates in CMX instructions, from the `cont` chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordSize {
    Bits16,
    Bits32,
}

/// `cont` chunk tag.
pub const CONT_TAG: Tag = Tag::new(b"cont");
// Offset of the coordinate size field within the `cont` chunk, header included.
const CONT_COORDSIZE: usize = 60;

impl CoordSize {
    /// Read the coordinate size out of the own bytes of a `cont` chunk.
    pub fn from_cont(own: &[u8]) -> Option<Self> {
        match own.get(CONT_COORDSIZE..CONT_COORDSIZE + 2)? {
            [0x32, 0x00] => Some(CoordSize::Bits16),
            [0x34, 0x00] => Some(CoordSize::Bits32),
            _ => None,
        }
    }
}

/// Facts about a document that are stated once, at the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RootContext {
    pub endian: Endian,
    pub version: FormatVersion,
    pub coord_size: Option<CoordSize>,
}

/// Check a file header for RIFF/RIFX framing and a recognized version tag.
///
/// Only the first 12 bytes are looked at. Returns `None` for anything that isn't a known
/// CorelDRAW or CMX container; the parser itself still accepts unknown versions.
pub fn sniff(header: &[u8]) -> Option<FormatVersion> {
    let root = header.get(..4)?;
    if root != Tag::RIFF.as_bytes() && root != Tag::RIFX.as_bytes() {
        return None;
    }
    let version = Tag::try_from(header.get(8..12)?).ok()?;
    Some(FormatVersion::from_tag(version)).filter(FormatVersion::is_known)
}
