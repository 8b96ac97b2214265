use crate::registry::ChunkClass;
use crate::tag::Tag;
use educe::Educe;

/// Size of a chunk header: tag plus length field.
pub const HEADER_LEN: usize = 8;
/// Size of a list header: tag, length field, and sub-tag.
pub const LIST_HEADER_LEN: usize = 12;

/// Index of a node within its [`ChunkTree`][crate::ChunkTree].
///
/// Ids are only meaningful for the tree that handed them out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The fixed part of a compressed list's content region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CmprHeader {
    /// Length of the main zlib stream.
    pub compressed_size: u32,
    /// Expected length of the main stream once inflated.
    pub uncompressed_size: u32,
    /// Length of the (still compressed) block-size table.
    pub block_table_size: u32,
}

/// What a node is, structurally.
///
/// Containers that hold a compressed stream (`Compressed`, `Packed`) keep their decoded content
/// in a separate list of nodes. That content is never serialized; the container re-emits its
/// compressed bytes verbatim. `decoded` is `None` when inflating failed and the region was kept
/// as-is.
#[derive(Clone, Debug, Educe)]
#[educe(PartialEq)]
pub enum NodeKind {
    /// The `RIFF`/`RIFX` list at the start of the file.
    Root,
    /// A list whose content parsed into children.
    List,
    /// A list kept as raw bytes, either because parsing its content failed or because its class
    /// is [`ChunkClass::Opaque`]. Its content is part of its own bytes.
    Unparsed,
    /// A `cmpr` list.
    Compressed {
        header: CmprHeader,
        block_sizes: Vec<u32>,
        #[educe(PartialEq(ignore))]
        decoded: Option<Vec<NodeId>>,
    },
    /// A leaf chunk.
    Object,
    /// An object holding a zlib stream of plain chunks.
    Packed {
        #[educe(PartialEq(ignore))]
        decoded: Option<Vec<NodeId>>,
    },
    /// Raw bytes left over when a decoded stream couldn't be parsed. Has no header.
    Opaque,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        use self::NodeKind::*;
        match self {
            Root => "Root",
            List => "List",
            Unparsed => "Unparsed",
            Compressed { .. } => "Compressed",
            Object => "Object",
            Packed { .. } => "Packed",
            Opaque => "Opaque",
        }
    }

    /// The decoded stream of a compressed container.
    pub fn decoded(&self) -> Option<&[NodeId]> {
        match self {
            NodeKind::Compressed { decoded, .. } | NodeKind::Packed { decoded } => {
                decoded.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn is_container(&self) -> bool {
        matches!(self, NodeKind::Compressed { .. } | NodeKind::Packed { .. })
    }
}

/// One chunk in a tree.
///
/// `own` holds exactly the bytes this node contributes to the serialized file: the header for
/// lists, the header plus payload (and pad byte) for objects, and the whole chunk for anything
/// kept raw. Children contribute their own bytes after it.
#[derive(Clone, Debug, Educe)]
#[educe(PartialEq)]
pub struct Node {
    pub(crate) tag: Tag,
    pub(crate) sub_tag: Option<Tag>,
    pub(crate) length: u32,
    pub(crate) class: ChunkClass,
    pub(crate) kind: NodeKind,
    pub(crate) own: Vec<u8>,
    #[educe(PartialEq(ignore))]
    pub(crate) parent: Option<NodeId>,
    #[educe(PartialEq(ignore))]
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn new(tag: Tag, sub_tag: Option<Tag>, kind: NodeKind, own: Vec<u8>) -> Self {
        Self {
            tag,
            sub_tag,
            length: 0,
            class: ChunkClass::Generic,
            kind,
            own,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn sub_tag(&self) -> Option<Tag> {
        self.sub_tag
    }

    /// Sub-tag for lists, tag for everything else.
    pub fn name(&self) -> Tag {
        self.sub_tag.unwrap_or(self.tag)
    }

    /// Length of the chunk body as the format defines it, before padding. Inside a compressed
    /// list this is the value looked up in the block-size table, not the raw field.
    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn class(&self) -> &ChunkClass {
        &self.class
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn own_bytes(&self) -> &[u8] {
        &self.own
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_list(&self) -> bool {
        self.sub_tag.is_some()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Bytes of own data that come before any children.
    pub fn header_len(&self) -> usize {
        match self.kind {
            NodeKind::Opaque => 0,
            _ if self.is_list() => LIST_HEADER_LEN,
            _ => HEADER_LEN,
        }
    }

    /// The node's body, without header or pad byte.
    pub fn payload(&self) -> &[u8] {
        match self.kind {
            NodeKind::Root | NodeKind::List => &[],
            NodeKind::Opaque => &self.own,
            NodeKind::Unparsed | NodeKind::Compressed { .. } => {
                self.own.get(LIST_HEADER_LEN..).unwrap_or(&[])
            }
            NodeKind::Object | NodeKind::Packed { .. } => {
                let body = self.own.get(HEADER_LEN..).unwrap_or(&[]);
                &body[..body.len().min(self.length as usize)]
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn object(body: &[u8], length: u32) -> Node {
        let mut own = b"abcd".to_vec();
        own.extend_from_slice(&length.to_le_bytes());
        own.extend_from_slice(body);
        let mut node = Node::new(Tag::new(b"abcd"), None, NodeKind::Object, own);
        node.length = length;
        node
    }

    #[test]
    fn payload_drops_pad() {
        let node = object(b"abc\0", 3);
        assert_eq!(node.payload(), b"abc");
        assert_eq!(node.own_bytes().len(), 12);
        assert_eq!(node.header_len(), HEADER_LEN);
    }

    #[test]
    fn list_names_by_sub_tag() {
        let node = Node::new(
            Tag::LIST,
            Some(Tag::new(b"page")),
            NodeKind::List,
            b"LIST\x04\x00\x00\x00page".to_vec(),
        );
        assert!(node.is_list());
        assert_eq!(node.name(), Tag::new(b"page"));
        assert_eq!(node.header_len(), LIST_HEADER_LEN);
        assert!(node.payload().is_empty());
    }

    #[test]
    fn equality_ignores_links() {
        let mut a = object(b"1234", 4);
        let b = object(b"1234", 4);
        a.parent = Some(NodeId(7));
        assert_eq!(a, b);
        assert_ne!(a, object(b"1235", 4));
    }

    #[test]
    fn decoded_ids_ignored_by_equality() {
        let a = NodeKind::Packed {
            decoded: Some(vec![NodeId(1)]),
        };
        let b = NodeKind::Packed {
            decoded: Some(vec![NodeId(9)]),
        };
        assert_eq!(a, b);
        assert_eq!(a.decoded(), Some(&[NodeId(1)][..]));
        assert_ne!(a, NodeKind::Object);
    }
}
