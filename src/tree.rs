//! The parsed chunk tree.
//!
//! Nodes live in a flat arena owned by [`ChunkTree`] and refer to each other by [`NodeId`].
//! Children are owned through their parent's child list; the parent link is only a lookup index,
//! used to compute offsets and to find the root.
//!
//! Serializing a tree concatenates each node's own bytes with the serialization of its children,
//! depth first. A tree that came out of the parser and was never edited serializes back to
//! exactly the input bytes.

use crate::cursor::Endian;
use crate::error::{Error, Result};
use crate::format::{CoordSize, FormatVersion, RootContext, CONT_TAG};
use crate::node::{Node, NodeId, NodeKind, HEADER_LEN};
use crate::tag::Tag;
use log::debug;
use std::io::Write;

/// A problem the parser recovered from, and the node it left behind.
#[derive(Debug)]
pub struct Diagnostic {
    pub node: NodeId,
    pub error: Error,
}

#[derive(Debug)]
pub struct ChunkTree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) trailing: Vec<u8>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl ChunkTree {
    /// Start a new, empty document with the given version sub-tag.
    pub fn new(format: Tag) -> Self {
        Self::with_root(Tag::RIFF, format)
    }

    /// Start a new, empty big-endian (`RIFX`) document.
    pub fn new_rifx(format: Tag) -> Self {
        Self::with_root(Tag::RIFX, format)
    }

    fn with_root(root: Tag, format: Tag) -> Self {
        let endian = if root == Tag::RIFX {
            Endian::Big
        } else {
            Endian::Little
        };
        let mut own = Vec::with_capacity(12);
        own.extend_from_slice(root.as_bytes());
        own.extend_from_slice(&endian.u32_bytes(4));
        own.extend_from_slice(format.as_bytes());
        let mut node = Node::new(root, Some(format), NodeKind::Root, own);
        node.length = 4;
        Self {
            nodes: vec![node],
            trailing: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Get a node. Panics if the id didn't come from this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// The decoded stream of a `cmpr` list or packed object, if it was inflated successfully.
    pub fn decoded(&self, id: NodeId) -> Option<&[NodeId]> {
        self.node(id).kind.decoded()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Problems recovered from during parsing.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Bytes found after the root chunk's declared end.
    pub fn trailing(&self) -> &[u8] {
        &self.trailing
    }

    /// Own bytes plus the total size of all children.
    pub fn total_chunk_size(&self, id: NodeId) -> usize {
        let node = self.node(id);
        node.own.len()
            + node
                .children
                .iter()
                .map(|&c| self.total_chunk_size(c))
                .sum::<usize>()
    }

    /// Position of a node's first byte.
    ///
    /// For nodes in the main tree this is the offset in the serialized file. Nodes inside a
    /// decoded stream are positioned relative to the start of that inflated stream.
    pub fn offset(&self, id: NodeId) -> usize {
        let Some(parent_id) = self.parent(id) else {
            return 0;
        };
        let parent = self.node(parent_id);
        let (base, siblings) = match parent.kind.decoded() {
            Some(decoded) => (0, decoded),
            _ => (self.offset(parent_id) + parent.own.len(), &parent.children[..]),
        };
        base + siblings
            .iter()
            .take_while(|&&s| s != id)
            .map(|&s| self.total_chunk_size(s))
            .sum::<usize>()
    }

    /// Walk up to the root of the tree this node belongs to.
    pub fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.parent(id) {
            id = parent;
        }
        id
    }

    /// Document-wide settings, as stated by the root and its `cont` chunk.
    pub fn context(&self) -> RootContext {
        let root = self.node(self.root());
        let endian = if root.tag == Tag::RIFX {
            Endian::Big
        } else {
            Endian::Little
        };
        let version = FormatVersion::from_tag(root.sub_tag.unwrap_or(root.tag));
        let coord_size = self
            .find_child(self.root(), CONT_TAG)
            .and_then(|cont| CoordSize::from_cont(&self.node(cont).own));
        RootContext {
            endian,
            version,
            coord_size,
        }
    }

    /// First child whose name (sub-tag for lists, tag otherwise) matches.
    pub fn find_child(&self, id: NodeId, name: Tag) -> Option<NodeId> {
        self.children(id)
            .iter()
            .chain(self.decoded(id).unwrap_or(&[]))
            .copied()
            .find(|&c| self.node(c).name() == name)
    }

    /// Sub-tag for lists, tag for everything else.
    pub fn name(&self, id: NodeId) -> Tag {
        self.node(id).name()
    }

    /// Dotted path of names from the root, like `RIFF.doc .page`.
    pub fn path(&self, id: NodeId) -> String {
        let node = self.node(id);
        let name = if node.parent.is_none() {
            node.tag
        } else {
            node.name()
        };
        match node.parent {
            Some(parent) => format!("{}.{}", self.path(parent), name),
            None => name.to_string(),
        }
    }

    /// Depth-first walk over every node reachable from the root, descending into decoded streams
    /// after a container's own children. Yields each node with its depth.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![(self.root(), 0)],
        }
    }

    /// Serialize the whole document.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_chunk_size(self.root()) + self.trailing.len());
        self.serialize_node(self.root(), &mut buf);
        buf.extend_from_slice(&self.trailing);
        buf
    }

    /// Append one subtree's serialization to a buffer.
    pub fn serialize_node(&self, id: NodeId, buf: &mut Vec<u8>) {
        let node = self.node(id);
        buf.extend_from_slice(&node.own);
        for &child in node.children.iter() {
            self.serialize_node(child, buf);
        }
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.serialize())?;
        Ok(())
    }

    /// True if the node sits inside the decoded stream of a compressed list or packed object.
    /// Such nodes are never serialized, so edits to them would be lost.
    pub fn in_decoded_stream(&self, mut id: NodeId) -> bool {
        while let Some(parent) = self.parent(id) {
            if self.node(parent).kind.is_container() {
                return true;
            }
            id = parent;
        }
        false
    }

    fn ensure_editable(&self, id: NodeId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(Error::BadEdit("Node doesn't exist".into()));
        }
        if self.in_decoded_stream(id) {
            return Err(Error::BadEdit(format!(
                "{} is inside a decoded stream and can't be edited",
                self.path(id)
            )));
        }
        Ok(())
    }

    /// Add a new object at the end of a list.
    pub fn append_object(&mut self, parent: NodeId, tag: Tag, payload: &[u8]) -> Result<NodeId> {
        if tag.is_list() || !tag.is_object_tag() {
            return Err(Error::BadEdit(format!("{} is not a valid object tag", tag)));
        }
        let length = length_field(payload.len())?;
        let endian = self.context().endian;
        let mut own = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
        own.extend_from_slice(tag.as_bytes());
        own.extend_from_slice(&endian.u32_bytes(length));
        own.extend_from_slice(payload);
        if length & 1 == 1 {
            own.push(0);
        }
        let mut node = Node::new(tag, None, NodeKind::Object, own);
        node.length = length;
        self.attach(parent, node)
    }

    /// Add a new, empty list at the end of a list.
    pub fn append_list(&mut self, parent: NodeId, sub_tag: Tag) -> Result<NodeId> {
        let endian = self.context().endian;
        let mut own = Vec::with_capacity(12);
        own.extend_from_slice(Tag::LIST.as_bytes());
        own.extend_from_slice(&endian.u32_bytes(4));
        own.extend_from_slice(sub_tag.as_bytes());
        let mut node = Node::new(Tag::LIST, Some(sub_tag), NodeKind::List, own);
        node.length = 4;
        self.attach(parent, node)
    }

    fn attach(&mut self, parent: NodeId, mut node: Node) -> Result<NodeId> {
        self.ensure_editable(parent)?;
        match self.get(parent).map(|p| &p.kind) {
            Some(NodeKind::Root) | Some(NodeKind::List) => (),
            Some(kind) => {
                return Err(Error::BadEdit(format!(
                    "Can't add children to a {} node",
                    kind.name()
                )))
            }
            None => return Err(Error::BadEdit("Parent node doesn't exist".into())),
        }
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    /// Replace an object's payload. The length field is rewritten and a pad byte added if needed.
    pub fn set_payload(&mut self, id: NodeId, payload: &[u8]) -> Result<()> {
        self.ensure_editable(id)?;
        let endian = self.context().endian;
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::BadEdit("Node doesn't exist".into()))?;
        if node.kind != NodeKind::Object {
            return Err(Error::BadEdit(format!(
                "Can't set the payload of a {} node",
                node.kind.name()
            )));
        }
        let length = length_field(payload.len())?;
        node.own.truncate(HEADER_LEN);
        endian.write_u32(&mut node.own[4..8], length);
        node.own.extend_from_slice(payload);
        if length & 1 == 1 {
            node.own.push(0);
        }
        node.length = length;
        Ok(())
    }

    /// Detach a node from its parent. The node stays in the arena but is no longer reachable
    /// from the root.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        self.ensure_editable(id)?;
        let parent = self
            .node(id)
            .parent
            .ok_or_else(|| Error::BadEdit("Can't remove the root".into()))?;
        self.nodes[parent.0].children.retain(|&c| c != id);
        self.nodes[id.0].parent = None;
        Ok(())
    }

    /// Rewrite every list's length field to match its current content. Objects already carry
    /// the right length; compressed containers and raw lists are left exactly as they are.
    ///
    /// Fails with [`Error::LengthTooLong`] if a list grew past what a length field can hold. Lists
    /// visited before the failure keep their new lengths.
    pub fn update_lengths(&mut self) -> Result<()> {
        let endian = self.context().endian;
        self.update_lengths_from(self.root(), endian)
    }

    fn update_lengths_from(&mut self, id: NodeId, endian: Endian) -> Result<()> {
        let children = self.nodes[id.0].children.clone();
        for child in children {
            self.update_lengths_from(child, endian)?;
        }
        if !matches!(self.nodes[id.0].kind, NodeKind::Root | NodeKind::List) {
            return Ok(());
        }
        let length = length_field(self.total_chunk_size(id) - HEADER_LEN)?;
        let node = &mut self.nodes[id.0];
        if node.length != length {
            debug!(
                "Updating length of {} from {} to {}",
                node.name(),
                node.length,
                length
            );
        }
        endian.write_u32(&mut node.own[4..8], length);
        node.length = length;
        Ok(())
    }

    fn subtree_eq(&self, id: NodeId, other: &ChunkTree, other_id: NodeId) -> bool {
        let (a, b) = (self.node(id), other.node(other_id));
        if a != b || a.children.len() != b.children.len() {
            return false;
        }
        let children_eq = a
            .children
            .iter()
            .zip(b.children.iter())
            .all(|(&x, &y)| self.subtree_eq(x, other, y));
        let decoded_eq = match (a.kind.decoded(), b.kind.decoded()) {
            (Some(x), Some(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|(&x, &y)| self.subtree_eq(x, other, y))
            }
            (None, None) => true,
            _ => false,
        };
        children_eq && decoded_eq
    }
}

/// Check that a body length fits in a 32-bit length field.
fn length_field(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::LengthTooLong {
        max: u32::MAX as usize,
        actual: len,
    })
}

/// Structural equality: same nodes in the same shape, regardless of ids or diagnostics.
impl PartialEq for ChunkTree {
    fn eq(&self, other: &Self) -> bool {
        self.trailing == other.trailing && self.subtree_eq(self.root(), other, other.root())
    }
}

pub struct Walk<'a> {
    tree: &'a ChunkTree,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (NodeId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        let node = self.tree.node(id);
        let decoded = node.kind.decoded().unwrap_or(&[]);
        for &next in node.children.iter().chain(decoded).rev() {
            self.stack.push((next, depth + 1));
        }
        Some((id, depth))
    }
}
