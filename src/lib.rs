//! riff-pack reads and writes RIFF-style chunk containers, as used by CorelDRAW (`.cdr`) and
//! Corel Presentation Exchange (`.cmx`) documents. The goal is a lossless tree: any file that
//! parses will serialize back to exactly the same bytes, however much of it could be understood.
//!
//! On top of plain RIFF, it handles:
//!
//! - Big-endian `RIFX` files, with every length field read in the root's byte order
//! - Padding: odd-length chunks are followed by a pad byte, kept as part of the chunk
//! - `cmpr` lists, whose content is a zlib stream of chunks plus a zlib table of block sizes.
//! 	Length fields inside the stream index into that table
//! - Packed objects, holding a zlib stream of plain chunks after a short preamble
//! - Graceful degradation. A list whose content doesn't parse is kept as raw bytes, and a
//! 	[`Diagnostic`] says why. Only bad root framing or a truncated file fail the whole parse
//! - A configurable [`TagRegistry`], so callers can tag chunks with a class without the parser
//! 	needing to know the format
//! - Progress reporting through a [`ProgressObserver`]
//! - Editing: append, replace, and remove chunks, then recompute list lengths
//!
//! The on-disk layout is described in the [`wire`] module.
//!
//! ```
//! use riff_pack::{parse, ParseOptions, Tag};
//!
//! let data = b"RIFF\x0e\x00\x00\x00TESTabcd\x02\x00\x00\x00hi".to_vec();
//! let tree = parse(&data, &ParseOptions::default()).unwrap();
//! let child = tree.children(tree.root())[0];
//! assert_eq!(tree.node(child).tag(), Tag::new(b"abcd"));
//! assert_eq!(tree.node(child).payload(), b"hi");
//! assert_eq!(tree.serialize(), data);
//! ```

mod compress;
mod config;
mod cursor;
mod error;
mod format;
mod node;
mod parser;
mod progress;
mod registry;
mod tag;
mod tree;

pub mod wire;

pub use self::compress::{to_indexed, CompressedBlockCodec, Inflated};
pub use self::config::ParseOptions;
pub use self::cursor::{ByteCursor, Endian};
pub use self::error::{Error, Result};
pub use self::format::{sniff, CoordSize, FormatVersion, RootContext};
pub use self::node::{CmprHeader, Node, NodeId, NodeKind};
pub use self::parser::{parse, parse_reader, ChunkTreeParser};
pub use self::progress::ProgressObserver;
pub use self::registry::{ChunkClass, TagRegistry};
pub use self::tag::Tag;
pub use self::tree::{ChunkTree, Diagnostic, Walk};

/// Default cap on the size of any single inflated stream: 256 MiB.
pub const MAX_INFLATED_SIZE: usize = config::MAX_INFLATED_SIZE;
/// Default limit on list nesting.
pub const MAX_DEPTH: usize = config::MAX_DEPTH;

/// Parse a file held in memory, reporting progress to `observer`.
pub fn parse_with_progress<'o>(
    data: &[u8],
    opts: &'o ParseOptions,
    observer: &'o mut dyn ProgressObserver,
) -> Result<ChunkTree> {
    ChunkTreeParser::new(opts).with_observer(observer).parse(data)
}
