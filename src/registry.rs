//! Tag-to-class dispatch.
//!
//! A [`TagRegistry`] decides how a chunk is interpreted. The parser consults it once per chunk;
//! unknown tags always fall back to [`ChunkClass::Generic`], so an empty registry parses any file
//! into plain lists and objects.

use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the parser should treat a chunk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkClass {
    /// Plain list or object.
    #[default]
    Generic,
    /// A list whose content is kept as raw bytes without attempting to parse children.
    Opaque,
    /// An object carrying a 12-byte preamble and a zlib stream of plain chunks.
    Packed,
    /// Parsed like [`Generic`][ChunkClass::Generic], but labeled so a higher layer can recognize
    /// the node without comparing tags itself.
    Named(String),
}

impl ChunkClass {
    pub fn named(name: &str) -> Self {
        ChunkClass::Named(name.to_string())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ChunkClass::Named(name) => Some(name),
            _ => None,
        }
    }
}

/// Maps chunk tags, and list sub-tags, to a [`ChunkClass`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TagRegistry {
    tags: BTreeMap<Tag, ChunkClass>,
    lists: BTreeMap<Tag, ChunkClass>,
}

impl TagRegistry {
    /// An empty registry. Everything becomes a generic node.
    pub fn new() -> Self {
        Self::default()
    }

    /// The class map used for CorelDRAW documents.
    pub fn cdr() -> Self {
        let mut reg = Self::new();
        reg.register_list(Tag::new(b"doc "), ChunkClass::named("doc"))
            .register_list(Tag::new(b"page"), ChunkClass::named("page"))
            .register_list(Tag::new(b"layr"), ChunkClass::named("layer"))
            .register_list(Tag::new(b"grp "), ChunkClass::named("group"))
            .register_list(Tag::new(b"obj "), ChunkClass::named("object"))
            .register_tag(Tag::new(b"bmp "), ChunkClass::named("bitmap"))
            .register_tag(Tag::new(b"font"), ChunkClass::named("font"))
            .register_tag(Tag::new(b"fild"), ChunkClass::named("fill"))
            .register_tag(Tag::new(b"fill"), ChunkClass::named("fill"))
            .register_tag(Tag::new(b"outl"), ChunkClass::named("outline"))
            .register_tag(Tag::new(b"loda"), ChunkClass::named("loda"))
            .register_tag(Tag::new(b"trfd"), ChunkClass::named("trafo"))
            .register_tag(Tag::PACK, ChunkClass::Packed);
        reg
    }

    /// Register a class for every chunk with the given tag.
    pub fn register_tag(&mut self, tag: Tag, class: ChunkClass) -> &mut Self {
        self.tags.insert(tag, class);
        self
    }

    /// Register a class for every list with the given sub-tag.
    pub fn register_list(&mut self, sub_tag: Tag, class: ChunkClass) -> &mut Self {
        self.lists.insert(sub_tag, class);
        self
    }

    /// Look up the class for a chunk. A registered sub-tag wins over a registered tag; anything
    /// unregistered is [`ChunkClass::Generic`].
    pub fn lookup(&self, tag: Tag, sub_tag: Option<Tag>) -> ChunkClass {
        sub_tag
            .and_then(|sub| self.lists.get(&sub))
            .or_else(|| self.tags.get(&tag))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.lists.is_empty()
    }
}
