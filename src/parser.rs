//! Recursive-descent parser from bytes to a [`ChunkTree`].
//!
//! There is one recovery rule, applied the same way at every level: if any item inside a list
//! fails to parse as an object or list, the whole list is kept as raw bytes with no children. The
//! same goes for a decoded compressed stream, which collapses into a single opaque node. Only two
//! things abort a parse: bad root framing, and running out of input at the top level.

use crate::compress::{CompressedBlockCodec, CMPR_HEADER_LEN, PACK_PREAMBLE_LEN};
use crate::config::ParseOptions;
use crate::cursor::{ByteCursor, Endian};
use crate::error::{Error, Result};
use crate::node::{Node, NodeId, NodeKind, HEADER_LEN, LIST_HEADER_LEN};
use crate::progress::{Progress, ProgressObserver, StreamSpan};
use crate::registry::ChunkClass;
use crate::tag::Tag;
use crate::tree::{ChunkTree, Diagnostic};
use log::{debug, warn};
use std::io::Read;

/// Parse a complete file held in memory.
pub fn parse(data: &[u8], opts: &ParseOptions) -> Result<ChunkTree> {
    ChunkTreeParser::new(opts).parse(data)
}

/// Read a file to its end, then parse it.
pub fn parse_reader<R: Read>(mut reader: R, opts: &ParseOptions) -> Result<ChunkTree> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    parse(&data, opts)
}

/// A configured parser, optionally reporting progress to an observer.
pub struct ChunkTreeParser<'o> {
    opts: &'o ParseOptions,
    observer: Option<&'o mut dyn ProgressObserver>,
}

impl<'o> ChunkTreeParser<'o> {
    pub fn new(opts: &'o ParseOptions) -> Self {
        Self {
            opts,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: &'o mut dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn parse(self, data: &[u8]) -> Result<ChunkTree> {
        let state = State {
            opts: self.opts,
            codec: CompressedBlockCodec::new(self.opts.max_inflated_size),
            progress: Progress::new(self.observer, data.len(), self.opts.progress_step),
            endian: Endian::Little,
            nodes: Vec::new(),
            diagnostics: Vec::new(),
        };
        state.parse_root(data)
    }
}

/// How length fields are read in the current stream.
#[derive(Clone, Copy, Debug)]
enum Lengths<'t> {
    /// The field is the byte length.
    Literal,
    /// The field indexes a block-size table holding the byte length.
    Indexed(&'t [u32]),
}

impl Lengths<'_> {
    fn resolve(self, raw: u32, offset: usize) -> Result<u32> {
        match self {
            Lengths::Literal => Ok(raw),
            Lengths::Indexed(table) => table.get(raw as usize).copied().ok_or_else(|| {
                Error::ambiguity(
                    offset,
                    format!(
                        "Block index {} is outside the {}-entry size table",
                        raw,
                        table.len()
                    ),
                )
            }),
        }
    }
}

/// Where progress events for the current stream come from.
#[derive(Clone, Copy, Debug)]
enum Track {
    /// Positions are offsets into the input.
    File,
    /// Positions are offsets into a stream inflated from this span of the input.
    Stream(StreamSpan),
    /// A stream nested inside another stream. Not reported.
    Quiet,
}

impl Track {
    fn nested(self, span: StreamSpan) -> Track {
        match self {
            Track::File => Track::Stream(span),
            _ => Track::Quiet,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Frame<'t> {
    lengths: Lengths<'t>,
    depth: usize,
    track: Track,
}

/// Odd lengths are followed by one pad byte, which is read as part of the body.
fn padded(length: u32) -> usize {
    length as usize + (length as usize & 1)
}

/// Inside a list, running out of bytes means an item claimed more than its list holds.
fn overrun(e: Error) -> Error {
    match e {
        Error::UnexpectedEof {
            step,
            offset,
            need,
            have,
        } => Error::ambiguity(
            offset,
            format!(
                "Item overruns its enclosing region on step [{}]: needed {} bytes, had {}",
                step, need, have
            ),
        ),
        e => e,
    }
}

struct State<'o> {
    opts: &'o ParseOptions,
    codec: CompressedBlockCodec,
    progress: Progress<'o>,
    endian: Endian,
    nodes: Vec<Node>,
    diagnostics: Vec<Diagnostic>,
}

impl<'o> State<'o> {
    fn parse_root(mut self, data: &[u8]) -> Result<ChunkTree> {
        if data.len() < LIST_HEADER_LEN {
            return Err(Error::BadRoot(format!(
                "File is {} bytes, too short for a root chunk",
                data.len()
            )));
        }
        let tag = Tag([data[0], data[1], data[2], data[3]]);
        self.endian = match tag {
            Tag::RIFF => Endian::Little,
            Tag::RIFX => Endian::Big,
            _ => {
                return Err(Error::BadRoot(format!(
                    "Expected RIFF or RIFX, found {}",
                    tag
                )))
            }
        };

        let mut cur = ByteCursor::new(data, self.endian);
        cur.read_tag("read root tag")?;
        let length = cur.read_u32("read root length")?;
        let format = cur.read_tag("read root format")?;
        let size = padded(length);
        if size < 4 {
            return Err(Error::BadRoot(format!(
                "Root length {} can't hold its format tag",
                length
            )));
        }
        let declared = size - 4;
        // With the input holding more than the root declares, an overrun is still recoverable.
        let bounded = declared < cur.remaining();
        if declared > cur.remaining() {
            debug!(
                "Root declares {} content bytes, file holds {}",
                declared,
                cur.remaining()
            );
        }
        let mut region = cur.sub(declared.min(cur.remaining()), "read root content")?;
        let content = region.rest();

        let own = data[..LIST_HEADER_LEN].to_vec();
        let mut root = Node::new(tag, Some(format), NodeKind::Root, own);
        root.length = length;
        root.class = self.opts.registry.lookup(tag, Some(format));
        let id = self.push(root);

        let frame = Frame {
            lengths: Lengths::Literal,
            depth: 1,
            track: Track::File,
        };
        let parsed = self.parse_region(&mut region, id, frame);
        let parsed = if bounded { parsed.map_err(overrun) } else { parsed };
        match parsed {
            Ok(children) => self.nodes[id.0].children = children,
            // Running out of file is fatal here; there's no enclosing list to fall back on.
            Err(e @ Error::UnexpectedEof { .. }) => return Err(e),
            Err(e) if e.is_recoverable() => self.collapse(id, content, e),
            Err(e) => return Err(e),
        }

        let trailing = cur.rest().to_vec();
        if !trailing.is_empty() {
            warn!("{} bytes follow the end of the root chunk", trailing.len());
            self.diagnostics.push(Diagnostic {
                node: id,
                error: Error::ambiguity(
                    cur.position(),
                    format!("{} bytes follow the end of the root chunk", trailing.len()),
                ),
            });
        }
        self.progress.finish();
        Ok(ChunkTree {
            nodes: self.nodes,
            trailing,
            diagnostics: self.diagnostics,
        })
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Drop every node from `len` onward, along with any diagnostics about them.
    fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
        self.diagnostics.retain(|d| d.node.0 < len);
    }

    fn report(&mut self, pos: usize, track: Track) {
        match track {
            Track::File => self.progress.advance(pos, None),
            Track::Stream(span) => self.progress.advance(pos, Some(&span)),
            Track::Quiet => (),
        }
    }

    /// Turn a list into raw bytes: forget any children and keep its whole content region.
    fn collapse(&mut self, id: NodeId, content: &[u8], error: Error) {
        self.truncate(id.0 + 1);
        let node = &mut self.nodes[id.0];
        warn!("Keeping list {} as raw bytes: {}", node.name(), error);
        node.kind = NodeKind::Unparsed;
        node.children.clear();
        node.own.extend_from_slice(content);
        self.diagnostics.push(Diagnostic { node: id, error });
    }

    fn compression_failed(&mut self, id: NodeId, error: Error) -> Result<()> {
        if self.opts.strict_compression {
            return Err(error);
        }
        warn!(
            "Keeping compressed {} undecoded: {}",
            self.nodes[id.0].name(),
            error
        );
        self.diagnostics.push(Diagnostic { node: id, error });
        Ok(())
    }

    /// Parse items until the region is used up. Any failure is returned as-is; the caller
    /// decides whether it can recover.
    fn parse_region(
        &mut self,
        region: &mut ByteCursor<'_>,
        parent: NodeId,
        frame: Frame<'_>,
    ) -> Result<Vec<NodeId>> {
        let mut children = Vec::new();
        while !region.is_empty() {
            children.push(self.parse_item(region, parent, frame)?);
        }
        Ok(children)
    }

    fn parse_item(
        &mut self,
        cur: &mut ByteCursor<'_>,
        parent: NodeId,
        frame: Frame<'_>,
    ) -> Result<NodeId> {
        let start = cur.position();
        let tag = cur.read_tag("read chunk tag")?;
        if tag == Tag::LIST {
            self.parse_list(cur, start, parent, frame)
        } else {
            self.parse_object(cur, start, tag, parent, frame)
        }
    }

    fn parse_object(
        &mut self,
        cur: &mut ByteCursor<'_>,
        start: usize,
        tag: Tag,
        parent: NodeId,
        frame: Frame<'_>,
    ) -> Result<NodeId> {
        if !tag.is_object_tag() {
            return Err(Error::ambiguity(
                start,
                format!("{} is not an object tag", tag),
            ));
        }
        let field = cur.read_bytes(4, "read object length")?;
        let length = frame.lengths.resolve(self.endian.read_u32(field), start)?;
        let body = cur.read_bytes(padded(length), "read object body")?;

        let mut own = Vec::with_capacity(HEADER_LEN + body.len());
        own.extend_from_slice(tag.as_bytes());
        own.extend_from_slice(field);
        own.extend_from_slice(body);
        let mut node = Node::new(tag, None, NodeKind::Object, own);
        node.length = length;
        node.parent = Some(parent);
        node.class = self.opts.registry.lookup(tag, None);
        let packed = node.class == ChunkClass::Packed;
        let id = self.push(node);
        self.report(cur.position(), frame.track);

        if packed {
            self.parse_packed(id, body, start + HEADER_LEN, frame)?;
        }
        Ok(id)
    }

    fn parse_list(
        &mut self,
        cur: &mut ByteCursor<'_>,
        start: usize,
        parent: NodeId,
        frame: Frame<'_>,
    ) -> Result<NodeId> {
        let field = cur.read_bytes(4, "read list length")?;
        let sub_tag = cur.read_tag("read list sub-tag")?;
        let length = frame.lengths.resolve(self.endian.read_u32(field), start)?;
        let size = padded(length);
        if size < 4 {
            return Err(Error::ambiguity(
                start,
                format!("List length {} can't hold its sub-tag", length),
            ));
        }
        let mut region = cur.sub(size - 4, "read list content")?;
        let content = region.rest();

        let mut own = Vec::with_capacity(LIST_HEADER_LEN);
        own.extend_from_slice(Tag::LIST.as_bytes());
        own.extend_from_slice(field);
        own.extend_from_slice(sub_tag.as_bytes());
        let mut node = Node::new(Tag::LIST, Some(sub_tag), NodeKind::List, own);
        node.length = length;
        node.parent = Some(parent);
        node.class = self.opts.registry.lookup(Tag::LIST, Some(sub_tag));
        let opaque = node.class == ChunkClass::Opaque;
        let id = self.push(node);

        // Block-indexed streams never nest another compressed list.
        if sub_tag == Tag::CMPR && matches!(frame.lengths, Lengths::Literal) {
            self.parse_compressed(id, content, region.start(), frame)?;
            self.report(cur.position(), frame.track);
            return Ok(id);
        }
        if opaque {
            let node = &mut self.nodes[id.0];
            node.kind = NodeKind::Unparsed;
            node.own.extend_from_slice(content);
            self.report(cur.position(), frame.track);
            return Ok(id);
        }
        if frame.depth >= self.opts.max_depth {
            let e = Error::ambiguity(
                start,
                format!("List nesting deeper than {}", self.opts.max_depth),
            );
            self.collapse(id, content, e);
            return Ok(id);
        }

        debug!("Parsing list {} at offset {:#x}", sub_tag, start);
        let inner = Frame {
            depth: frame.depth + 1,
            ..frame
        };
        match self.parse_region(&mut region, id, inner).map_err(overrun) {
            Ok(children) => self.nodes[id.0].children = children,
            Err(e) if e.is_recoverable() => {
                self.collapse(id, content, e);
                self.report(cur.position(), frame.track);
            }
            Err(e) => return Err(e),
        }
        Ok(id)
    }

    fn parse_compressed(
        &mut self,
        id: NodeId,
        content: &[u8],
        offset: usize,
        frame: Frame<'_>,
    ) -> Result<()> {
        self.nodes[id.0].own.extend_from_slice(content);
        let kind = match self.codec.decode(content, offset) {
            Ok(inflated) => {
                let span = StreamSpan {
                    start: offset + CMPR_HEADER_LEN,
                    size: inflated.header.compressed_size as usize,
                    inflated: inflated.stream.len(),
                };
                let inner = Frame {
                    lengths: Lengths::Indexed(&inflated.block_sizes),
                    depth: frame.depth + 1,
                    track: frame.track.nested(span),
                };
                let decoded = self.parse_stream(id, &inflated.stream, inner)?;
                NodeKind::Compressed {
                    header: inflated.header,
                    block_sizes: inflated.block_sizes,
                    decoded: Some(decoded),
                }
            }
            Err(e) => {
                let header = CompressedBlockCodec::read_header(content, offset).unwrap_or_default();
                self.compression_failed(id, e)?;
                NodeKind::Compressed {
                    header,
                    block_sizes: Vec::new(),
                    decoded: None,
                }
            }
        };
        self.nodes[id.0].kind = kind;
        Ok(())
    }

    fn parse_packed(
        &mut self,
        id: NodeId,
        body: &[u8],
        offset: usize,
        frame: Frame<'_>,
    ) -> Result<()> {
        let kind = match self.codec.decode_pack(body, offset) {
            Ok(stream) => {
                let span = StreamSpan {
                    start: offset + PACK_PREAMBLE_LEN,
                    size: body.len().saturating_sub(PACK_PREAMBLE_LEN),
                    inflated: stream.len(),
                };
                let inner = Frame {
                    lengths: Lengths::Literal,
                    depth: frame.depth + 1,
                    track: frame.track.nested(span),
                };
                let decoded = self.parse_stream(id, &stream, inner)?;
                NodeKind::Packed {
                    decoded: Some(decoded),
                }
            }
            Err(e) => {
                self.compression_failed(id, e)?;
                NodeKind::Packed { decoded: None }
            }
        };
        self.nodes[id.0].kind = kind;
        Ok(())
    }

    /// Parse an inflated stream into the decoded children of `owner`. If the stream doesn't
    /// parse, it becomes one opaque node holding all of it.
    fn parse_stream(
        &mut self,
        owner: NodeId,
        stream: &[u8],
        frame: Frame<'_>,
    ) -> Result<Vec<NodeId>> {
        if frame.depth >= self.opts.max_depth {
            let e = Error::ambiguity(
                0,
                format!("Stream nesting deeper than {}", self.opts.max_depth),
            );
            return Ok(vec![self.opaque(owner, stream, e)]);
        }
        let mark = self.nodes.len();
        let mut cur = ByteCursor::new(stream, self.endian);
        match self.parse_region(&mut cur, owner, frame).map_err(overrun) {
            Ok(ids) => Ok(ids),
            Err(e) if e.is_recoverable() => {
                self.truncate(mark);
                Ok(vec![self.opaque(owner, stream, e)])
            }
            Err(e) => Err(e),
        }
    }

    fn opaque(&mut self, owner: NodeId, stream: &[u8], error: Error) -> NodeId {
        warn!(
            "Keeping decoded stream of {} as raw bytes: {}",
            self.nodes[owner.0].name(),
            error
        );
        let mut node = Node::new(Tag::OPAQUE, None, NodeKind::Opaque, stream.to_vec());
        node.length = stream.len() as u32;
        node.parent = Some(owner);
        let id = self.push(node);
        self.diagnostics.push(Diagnostic { node: id, error });
        id
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::TagRegistry;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    fn u32le(v: u32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn obj(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&u32le(body.len() as u32));
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn list(sub_tag: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let mut out = b"LIST".to_vec();
        out.extend_from_slice(&u32le(content.len() as u32 + 4));
        out.extend_from_slice(sub_tag);
        out.extend_from_slice(content);
        out
    }

    fn riff(format: &[u8; 4], content: &[u8]) -> Vec<u8> {
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&u32le(content.len() as u32 + 4));
        out.extend_from_slice(format);
        out.extend_from_slice(content);
        out
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn cmpr(stream: &[u8], block_sizes: &[u32]) -> Vec<u8> {
        let content = CompressedBlockCodec::encode(stream, block_sizes).unwrap();
        let mut out = list(b"cmpr", &content);
        if content.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn parse_default(data: &[u8]) -> ChunkTree {
        let tree = parse(data, &ParseOptions::default()).expect("Should have parsed");
        assert_eq!(tree.serialize(), data, "Round trip should be byte-exact");
        tree
    }

    mod plain {
        use super::*;

        #[test]
        fn empty_root() {
            let mut data = b"RIFF".to_vec();
            data.extend_from_slice(&u32le(4));
            data.extend_from_slice(b"TEST");
            let tree = parse_default(&data);
            let root = tree.node(tree.root());
            assert_eq!(root.tag(), Tag::RIFF);
            assert_eq!(root.sub_tag(), Some(Tag::new(b"TEST")));
            assert_eq!(*root.kind(), NodeKind::Root);
            assert!(root.children().is_empty());
            assert_eq!(root.own_bytes(), &data[..]);
            assert!(tree.diagnostics().is_empty());
        }

        #[test]
        fn root_with_one_object() {
            let mut data = b"RIFF".to_vec();
            data.extend_from_slice(&u32le(20));
            data.extend_from_slice(b"TEST");
            data.extend_from_slice(b"abcd");
            data.extend_from_slice(&u32le(4));
            data.extend_from_slice(b"1234");
            let tree = parse_default(&data);
            let children = tree.children(tree.root());
            assert_eq!(children.len(), 1);
            let child = tree.node(children[0]);
            assert_eq!(child.tag(), Tag::new(b"abcd"));
            assert_eq!(child.sub_tag(), None);
            assert_eq!(child.own_bytes(), &data[12..]);
            assert_eq!(child.payload(), b"1234");
            assert_eq!(tree.offset(children[0]), 12);
        }

        #[test]
        fn odd_length_keeps_pad_byte() {
            let data = riff(b"TEST", &obj(b"abcd", b"xyz"));
            let tree = parse_default(&data);
            let child = tree.node(tree.children(tree.root())[0]);
            assert_eq!(child.length(), 3);
            assert_eq!(child.own_bytes(), b"abcd\x03\x00\x00\x00xyz\0");
            assert_eq!(child.payload(), b"xyz");
        }

        #[test]
        fn nested_lists_and_offsets() {
            let mut inner = obj(b"aaaa", b"1");
            inner.extend(list(b"layr", &obj(b"bbbb", b"22")));
            let mut content = list(b"page", &inner);
            content.extend(obj(b"cccc", b"333"));
            let data = riff(b"CDRC", &content);
            let tree = parse_default(&data);

            let root = tree.root();
            let page = tree.find_child(root, Tag::new(b"page")).unwrap();
            let layr = tree.find_child(page, Tag::new(b"layr")).unwrap();
            let bbbb = tree.find_child(layr, Tag::new(b"bbbb")).unwrap();
            let cccc = tree.find_child(root, Tag::new(b"cccc")).unwrap();
            assert_eq!(tree.offset(page), 12);
            assert_eq!(tree.offset(layr), 12 + 12 + 10);
            assert_eq!(tree.offset(bbbb), 12 + 12 + 10 + 12);
            assert_eq!(tree.offset(cccc), 12 + tree.total_chunk_size(page));
            assert_eq!(tree.path(bbbb), "RIFF.page.layr.bbbb");
            assert_eq!(&data[tree.offset(cccc)..tree.offset(cccc) + 4], b"cccc");

            for (id, _) in tree.walk() {
                let node = tree.node(id);
                let sum: usize = node
                    .children()
                    .iter()
                    .map(|&c| tree.total_chunk_size(c))
                    .sum();
                assert_eq!(tree.total_chunk_size(id), node.own_bytes().len() + sum);
                let mut at = tree.offset(id) + node.own_bytes().len();
                for &c in node.children() {
                    assert_eq!(tree.offset(c), at);
                    at += tree.total_chunk_size(c);
                }
            }
        }

        #[test]
        fn reparse_is_idempotent() {
            let mut content = list(b"page", &obj(b"aaaa", b"hello"));
            content.extend(obj(b"bbbb", b""));
            let data = riff(b"TEST", &content);
            let first = parse_default(&data);
            let second = parse_default(&first.serialize());
            assert_eq!(first, second);
        }
    }

    mod recovery {
        use super::*;

        #[test]
        fn garbage_collapses_whole_list() {
            let mut inner = obj(b"good", b"1234");
            inner.extend_from_slice(b"\x01\x02\x03\x04\x05");
            inner.push(0);
            let mut content = list(b"page", &inner);
            content.extend(obj(b"next", b"ok"));
            let data = riff(b"TEST", &content);
            let tree = parse_default(&data);

            let children = tree.children(tree.root());
            assert_eq!(children.len(), 2);
            let page = tree.node(children[0]);
            assert_eq!(*page.kind(), NodeKind::Unparsed);
            assert!(page.children().is_empty());
            assert_eq!(page.payload(), &inner[..]);
            assert_eq!(page.own_bytes().len(), LIST_HEADER_LEN + inner.len());
            assert_eq!(tree.node(children[1]).payload(), b"ok");

            assert_eq!(tree.diagnostics().len(), 1);
            assert_eq!(tree.diagnostics()[0].node, children[0]);
            assert!(tree.diagnostics()[0].error.is_recoverable());
        }

        #[test]
        fn overrun_inside_list_collapses() {
            let mut bad = b"abcd".to_vec();
            bad.extend_from_slice(&u32le(100));
            bad.extend_from_slice(b"xy");
            let data = riff(b"TEST", &list(b"page", &bad));
            let tree = parse_default(&data);
            let page = tree.node(tree.children(tree.root())[0]);
            assert_eq!(*page.kind(), NodeKind::Unparsed);
            assert_eq!(page.payload(), &bad[..]);
        }

        #[test]
        fn inner_collapse_diagnostic_dropped_with_outer() {
            // The inner list collapses first, then the outer list hits garbage too.
            let mut inner = list(b"layr", b"\x00\x00\x00\x00");
            inner.extend_from_slice(b"\xff\xff\xff\xff\x00\x00\x00\x00");
            let data = riff(b"TEST", &list(b"page", &inner));
            let tree = parse_default(&data);
            assert_eq!(tree.diagnostics().len(), 1);
            let page = tree.children(tree.root())[0];
            assert_eq!(tree.diagnostics()[0].node, page);
            assert_eq!(tree.walk().count(), 2);
        }

        #[test]
        fn garbage_at_top_collapses_root() {
            let mut content = obj(b"abcd", b"12");
            content.extend_from_slice(b"\x00\x01\x02\x03\x04\x05\x06\x07");
            let data = riff(b"TEST", &content);
            let tree = parse_default(&data);
            let root = tree.node(tree.root());
            assert_eq!(*root.kind(), NodeKind::Unparsed);
            assert!(root.children().is_empty());
            assert_eq!(root.own_bytes(), &data[..]);
        }

        #[test]
        fn truncated_file_is_fatal() {
            let mut data = riff(b"TEST", &obj(b"abcd", b"12345678"));
            data.truncate(data.len() - 3);
            match parse(&data, &ParseOptions::default()) {
                Err(Error::UnexpectedEof { .. }) => (),
                other => panic!("Expected UnexpectedEof, got {:?}", other),
            }
        }

        #[test]
        fn bad_roots() {
            let opts = ParseOptions::default();
            assert!(matches!(parse(b"RIFF\x04\x00", &opts), Err(Error::BadRoot(_))));
            assert!(matches!(
                parse(b"FORM\x04\x00\x00\x00TEST", &opts),
                Err(Error::BadRoot(_))
            ));
            assert!(matches!(
                parse(b"RIFF\x02\x00\x00\x00TEST", &opts),
                Err(Error::BadRoot(_))
            ));
        }

        #[test]
        fn trailing_bytes_preserved() {
            let mut data = riff(b"TEST", &obj(b"abcd", b"12"));
            data.extend_from_slice(b"junk");
            let tree = parse_default(&data);
            assert_eq!(tree.trailing(), b"junk");
            assert_eq!(tree.children(tree.root()).len(), 1);
            assert_eq!(tree.diagnostics().len(), 1);
        }

        #[test]
        fn overrun_of_short_root_collapses() {
            let mut data = b"RIFF".to_vec();
            data.extend_from_slice(&u32le(16));
            data.extend_from_slice(b"TEST");
            data.extend(obj(b"abcd", b"12345678"));
            let tree = parse_default(&data);
            let root = tree.node(tree.root());
            assert_eq!(*root.kind(), NodeKind::Unparsed);
            assert!(root.children().is_empty());
            assert_eq!(root.own_bytes(), &data[..24]);
            assert_eq!(tree.trailing(), b"5678");
            assert_eq!(tree.diagnostics().len(), 2);
            assert!(tree.diagnostics().iter().all(|d| d.node == tree.root()));
        }

        #[test]
        fn depth_limit() {
            let mut content = obj(b"leaf", b"x");
            for _ in 0..5 {
                content = list(b"deep", &content);
            }
            let data = riff(b"TEST", &content);
            let opts = ParseOptions {
                max_depth: 3,
                ..ParseOptions::default()
            };
            let tree = parse(&data, &opts).unwrap();
            assert_eq!(tree.serialize(), data);
            let max = tree.walk().map(|(_, depth)| depth).max().unwrap();
            assert_eq!(max, 3);
            assert_eq!(tree.diagnostics().len(), 1);
        }
    }

    mod compressed {
        use super::*;

        #[test]
        fn block_index_remaps_length() {
            let mut stream = b"abcd".to_vec();
            stream.extend_from_slice(&u32le(1));
            stream.extend_from_slice(b"0123456789");
            stream.extend_from_slice(b"efgh");
            stream.extend_from_slice(&u32le(0));
            stream.extend_from_slice(b"xyz\0");
            let data = riff(b"CDRC", &cmpr(&stream, &[3, 10, 1]));
            let tree = parse_default(&data);

            let list_id = tree.children(tree.root())[0];
            let list = tree.node(list_id);
            assert!(list.children().is_empty());
            assert_eq!(list.own_bytes(), &data[12..]);
            let decoded = tree.decoded(list_id).unwrap();
            assert_eq!(decoded.len(), 2);
            let first = tree.node(decoded[0]);
            assert_eq!(first.length(), 10);
            assert_eq!(first.payload(), b"0123456789");
            // The raw index is kept verbatim
            assert_eq!(&first.own_bytes()[4..8], &u32le(1));
            let second = tree.node(decoded[1]);
            assert_eq!(second.length(), 3);
            assert_eq!(second.payload(), b"xyz");

            assert_eq!(tree.offset(decoded[0]), 0);
            assert_eq!(tree.offset(decoded[1]), 18);
            match list.kind() {
                NodeKind::Compressed {
                    header,
                    block_sizes,
                    ..
                } => {
                    assert_eq!(header.uncompressed_size as usize, stream.len());
                    assert_eq!(block_sizes, &vec![3, 10, 1]);
                }
                other => panic!("Expected a compressed list, got {:?}", other),
            }
        }

        #[test]
        fn single_object_payload_from_table() {
            let mut stream = b"abcd".to_vec();
            stream.extend_from_slice(&u32le(0));
            stream.extend_from_slice(b"wxyz");
            let data = riff(b"CDRC", &cmpr(&stream, &[4]));
            let tree = parse_default(&data);
            let list_id = tree.children(tree.root())[0];
            let decoded = tree.decoded(list_id).unwrap();
            assert_eq!(decoded.len(), 1);
            let child = tree.node(decoded[0]);
            assert_eq!(child.tag(), Tag::new(b"abcd"));
            assert_eq!(child.payload().len(), 4);
        }

        #[test]
        fn nested_list_in_stream() {
            let mut stream = b"LIST".to_vec();
            stream.extend_from_slice(&u32le(0));
            stream.extend_from_slice(b"page");
            stream.extend_from_slice(b"abcd");
            stream.extend_from_slice(&u32le(1));
            stream.extend_from_slice(b"12");
            let data = riff(b"CDRC", &cmpr(&stream, &[14, 2]));
            let tree = parse_default(&data);
            let list_id = tree.children(tree.root())[0];
            let page = tree.decoded(list_id).unwrap()[0];
            assert_eq!(tree.node(page).name(), Tag::new(b"page"));
            let abcd = tree.children(page)[0];
            assert_eq!(tree.node(abcd).payload(), b"12");
            assert_eq!(tree.offset(abcd), 12);
            assert_eq!(tree.path(abcd), "RIFF.cmpr.page.abcd");
        }

        #[test]
        fn bad_index_collapses_stream() {
            let mut stream = b"abcd".to_vec();
            stream.extend_from_slice(&u32le(7));
            stream.extend_from_slice(b"1234");
            let data = riff(b"CDRC", &cmpr(&stream, &[4]));
            let tree = parse_default(&data);
            let list_id = tree.children(tree.root())[0];
            let decoded = tree.decoded(list_id).unwrap();
            assert_eq!(decoded.len(), 1);
            let opaque = tree.node(decoded[0]);
            assert_eq!(*opaque.kind(), NodeKind::Opaque);
            assert_eq!(opaque.own_bytes(), &stream[..]);
            assert_eq!(tree.diagnostics().len(), 1);
            assert_eq!(tree.diagnostics()[0].node, decoded[0]);
        }

        #[test]
        fn corrupt_deflate_skips_and_continues() {
            let mut chunk = cmpr(b"abcd\x00\x00\x00\x0012", &[2]);
            chunk[12 + CMPR_HEADER_LEN] ^= 0xff;
            let mut content = chunk;
            content.extend(obj(b"next", b"ok"));
            let data = riff(b"CDRC", &content);

            let tree = parse_default(&data);
            let children = tree.children(tree.root());
            assert_eq!(children.len(), 2);
            assert_eq!(tree.decoded(children[0]), None);
            assert_eq!(tree.node(children[1]).payload(), b"ok");
            assert!(matches!(
                tree.diagnostics()[0].error,
                Error::CompressionFailure { .. }
            ));

            let strict = ParseOptions {
                strict_compression: true,
                ..ParseOptions::default()
            };
            assert!(matches!(
                parse(&data, &strict),
                Err(Error::CompressionFailure { .. })
            ));
        }

        #[test]
        fn encoded_list_roundtrip() {
            let mut plain = obj(b"aaaa", b"one");
            plain.extend(list(b"grp ", &obj(b"bbbb", b"two!")));
            let chunk = CompressedBlockCodec::encode_list(&plain, Endian::Little).unwrap();
            let mut content = chunk;
            content.extend(obj(b"tail", b""));
            let data = riff(b"CDRD", &content);
            let tree = parse_default(&data);

            let list_id = tree.children(tree.root())[0];
            let decoded = tree.decoded(list_id).unwrap();
            assert_eq!(decoded.len(), 2);
            assert_eq!(tree.node(decoded[0]).payload(), b"one");
            let grp = decoded[1];
            assert_eq!(tree.node(grp).name(), Tag::new(b"grp "));
            assert_eq!(tree.node(tree.children(grp)[0]).payload(), b"two!");
            let mut stream = Vec::new();
            for &id in decoded {
                tree.serialize_node(id, &mut stream);
            }
            assert_eq!(stream.len(), plain.len());
        }
    }

    mod classes {
        use super::*;

        fn packed_file() -> (Vec<u8>, Vec<u8>) {
            let mut inner = obj(b"aaaa", b"12");
            inner.extend(list(b"page", &obj(b"bbbb", b"3456")));
            let mut body = vec![0u8; PACK_PREAMBLE_LEN];
            body.extend(zlib(&inner));
            (riff(b"CDRC", &obj(b"pack", &body)), inner)
        }

        #[test]
        fn pack_decoded_with_registry() {
            let (data, _) = packed_file();
            let opts = ParseOptions::with_registry(TagRegistry::cdr());
            let tree = parse(&data, &opts).unwrap();
            assert_eq!(tree.serialize(), data);
            let pack = tree.children(tree.root())[0];
            assert_eq!(*tree.node(pack).class(), ChunkClass::Packed);
            let decoded = tree.decoded(pack).unwrap();
            assert_eq!(decoded.len(), 2);
            assert_eq!(tree.node(decoded[0]).payload(), b"12");
            let page = decoded[1];
            assert_eq!(tree.node(page).class().name(), Some("page"));
            assert_eq!(tree.offset(page), 10);
        }

        #[test]
        fn pack_is_plain_without_registry() {
            let (data, _) = packed_file();
            let tree = parse_default(&data);
            let pack = tree.children(tree.root())[0];
            assert_eq!(*tree.node(pack).kind(), NodeKind::Object);
            assert_eq!(tree.decoded(pack), None);
        }

        #[test]
        fn registry_does_not_change_bytes() {
            let (data, _) = packed_file();
            let plain = parse_default(&data);
            let rich = parse(&data, &ParseOptions::with_registry(TagRegistry::cdr())).unwrap();
            assert_eq!(plain.serialize(), rich.serialize());
        }

        #[test]
        fn opaque_list_class() {
            let data = riff(b"TEST", &list(b"stlt", b"\x00\x01\x02\x03"));
            let mut reg = TagRegistry::new();
            reg.register_list(Tag::new(b"stlt"), ChunkClass::Opaque);
            let tree = parse(&data, &ParseOptions::with_registry(reg)).unwrap();
            let stlt = tree.node(tree.children(tree.root())[0]);
            assert_eq!(*stlt.kind(), NodeKind::Unparsed);
            assert_eq!(stlt.payload(), b"\x00\x01\x02\x03");
            assert!(tree.diagnostics().is_empty());
            assert_eq!(tree.serialize(), data);
        }

        #[test]
        fn rifx_root_context() {
            let mut cont = vec![0u8; 80];
            cont[60] = 0x34;
            let mut body = b"cont".to_vec();
            body.extend_from_slice(&(cont.len() as u32 - 8).to_be_bytes());
            body.extend_from_slice(&cont[8..]);
            let mut data = b"RIFX".to_vec();
            data.extend_from_slice(&(body.len() as u32 + 4).to_be_bytes());
            data.extend_from_slice(b"CMX1");
            data.extend_from_slice(&body);

            let tree = parse_default(&data);
            let ctx = tree.context();
            assert_eq!(ctx.endian, Endian::Big);
            assert_eq!(ctx.version, crate::FormatVersion::Cmx1);
            assert_eq!(ctx.coord_size, Some(crate::CoordSize::Bits32));
            let cont_id = tree.children(tree.root())[0];
            assert_eq!(tree.node(cont_id).length(), 72);
        }
    }

    mod progress {
        use super::*;

        #[test]
        fn fractions_are_monotonic() {
            let mut content = Vec::new();
            for i in 0..50u8 {
                content.extend(obj(b"item", &[i; 20]));
            }
            let mut stream = Vec::new();
            let mut sizes = Vec::new();
            for i in 0..20u32 {
                stream.extend_from_slice(b"zzzz");
                stream.extend_from_slice(&u32le(i));
                stream.extend_from_slice(&[0u8; 8]);
                sizes.push(8);
            }
            content.extend(cmpr(&stream, &sizes));
            let data = riff(b"TEST", &content);

            let mut seen: Vec<f32> = Vec::new();
            let mut record = |f: f32| seen.push(f);
            let opts = ParseOptions::default();
            let tree = ChunkTreeParser::new(&opts)
                .with_observer(&mut record)
                .parse(&data)
                .unwrap();
            assert!(!seen.is_empty());
            assert!(seen.windows(2).all(|w| w[0] <= w[1]));
            assert!(seen.iter().all(|&f| (0.0..=1.0).contains(&f)));
            assert_eq!(*seen.last().unwrap(), 1.0);
            assert_eq!(tree, parse(&data, &opts).unwrap());
        }
    }

    mod random {
        use super::*;
        use rand::{rngs::StdRng, Rng, SeedableRng};

        const TAGS: [&[u8; 4]; 5] = [b"abcd", b"outl", b"fild", b"bmp ", b"x9z\0"];
        const LISTS: [&[u8; 4]; 4] = [b"page", b"layr", b"grp ", b"obj "];

        /// Random chunk content. Compressed lists never nest, so `compress` is off inside one.
        fn region<R: Rng>(rng: &mut R, depth: usize, compress: bool) -> Vec<u8> {
            let mut out = Vec::new();
            for _ in 0..rng.gen_range(0..6) {
                let roll = rng.gen_range(0..10);
                if roll < 2 && depth < 4 {
                    let sub = LISTS[rng.gen_range(0..LISTS.len())];
                    out.extend(list(sub, &region(rng, depth + 1, compress)));
                } else if roll == 2 && depth < 4 && compress {
                    let plain = region(rng, depth + 1, false);
                    out.extend(CompressedBlockCodec::encode_list(&plain, Endian::Little).unwrap());
                } else {
                    let tag = TAGS[rng.gen_range(0..TAGS.len())];
                    let len = rng.gen_range(0..40);
                    let body: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                    out.extend(obj(tag, &body));
                }
            }
            out
        }

        #[test]
        fn generated_documents_roundtrip() {
            let mut rng = StdRng::seed_from_u64(0x5249_4646);
            for _ in 0..200 {
                let data = riff(b"CDRD", &region(&mut rng, 0, true));
                let tree = parse_default(&data);
                assert!(tree.diagnostics().is_empty());
                assert_eq!(tree.total_chunk_size(tree.root()), data.len());
                let again = parse_default(&tree.serialize());
                assert_eq!(tree, again);
            }
        }

        #[test]
        fn corrupted_documents_never_lose_bytes() {
            let mut rng = StdRng::seed_from_u64(7);
            for _ in 0..200 {
                let mut data = riff(b"CDRC", &region(&mut rng, 0, true));
                for _ in 0..rng.gen_range(1..4) {
                    let at = rng.gen_range(12..data.len().max(13));
                    if at < data.len() {
                        data[at] = rng.gen();
                    }
                }
                match parse(&data, &ParseOptions::default()) {
                    Ok(tree) => assert_eq!(tree.serialize(), data),
                    Err(Error::UnexpectedEof { .. }) => (),
                    Err(e) => panic!("Unexpected failure: {}", e),
                }
            }
        }
    }

    #[test]
    fn reader_entry_point() {
        let data = riff(b"TEST", &obj(b"abcd", b"12"));
        let tree = parse_reader(&data[..], &ParseOptions::default()).unwrap();
        assert_eq!(tree.serialize(), data);
    }
}
