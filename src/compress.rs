//! Codec for `cmpr` lists and packed objects.
//!
//! A `cmpr` list's content region is laid out as:
//!
//! ```text
//! compressed_size: u32 | uncompressed_size: u32 | block_table_size: u32 | 12 reserved bytes
//! zlib(main stream)    | zlib(block-size table)
//! ```
//!
//! The main stream inflates to ordinary chunks, except that every length field holds an index
//! into the block-size table (an array of little-endian u32) instead of a byte count.

use crate::cursor::Endian;
use crate::error::{Error, Result};
use crate::node::{CmprHeader, HEADER_LEN};
use crate::tag::Tag;
use byteorder::{ByteOrder, LittleEndian};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use log::debug;
use std::io::{Read, Write};

/// Size of the fixed header at the start of a `cmpr` content region.
pub const CMPR_HEADER_LEN: usize = 24;
/// Bytes preceding the zlib stream in a packed object's payload.
pub const PACK_PREAMBLE_LEN: usize = 12;

/// The result of inflating a `cmpr` content region.
#[derive(Clone, Debug)]
pub struct Inflated {
    pub header: CmprHeader,
    pub stream: Vec<u8>,
    pub block_sizes: Vec<u32>,
}

#[derive(Clone, Copy, Debug)]
pub struct CompressedBlockCodec {
    max_size: usize,
}

impl CompressedBlockCodec {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Read the fixed header of a `cmpr` content region.
    pub fn read_header(content: &[u8], offset: usize) -> Result<CmprHeader> {
        if content.len() < CMPR_HEADER_LEN {
            return Err(Error::compression(
                offset,
                format!(
                    "Compressed list has {} content bytes, need at least {}",
                    content.len(),
                    CMPR_HEADER_LEN
                ),
            ));
        }
        Ok(CmprHeader {
            compressed_size: LittleEndian::read_u32(&content[0..4]),
            uncompressed_size: LittleEndian::read_u32(&content[4..8]),
            block_table_size: LittleEndian::read_u32(&content[8..12]),
        })
    }

    /// Inflate a `cmpr` content region. `offset` is the region's absolute position, for errors.
    pub fn decode(&self, content: &[u8], offset: usize) -> Result<Inflated> {
        let header = Self::read_header(content, offset)?;
        let main_start = CMPR_HEADER_LEN;
        let main_end = main_start
            .checked_add(header.compressed_size as usize)
            .filter(|&end| end <= content.len())
            .ok_or_else(|| {
                Error::compression(
                    offset,
                    format!(
                        "Compressed size {} runs past the {}-byte region",
                        header.compressed_size,
                        content.len()
                    ),
                )
            })?;

        let stream = self.inflate(&content[main_start..main_end], offset + main_start)?;
        if stream.len() != header.uncompressed_size as usize {
            return Err(Error::compression(
                offset,
                format!(
                    "Inflated to {} bytes, header declared {}",
                    stream.len(),
                    header.uncompressed_size
                ),
            ));
        }

        let table = self.inflate(&content[main_end..], offset + main_end)?;
        if table.len() % 4 != 0 {
            return Err(Error::compression(
                offset + main_end,
                format!(
                    "Block-size table inflated to {} bytes, not a whole number of entries",
                    table.len()
                ),
            ));
        }
        let block_sizes: Vec<u32> = table
            .chunks_exact(4)
            .map(LittleEndian::read_u32)
            .collect();
        debug!(
            "Inflated compressed list: {} -> {} bytes, {} block sizes",
            header.compressed_size,
            stream.len(),
            block_sizes.len()
        );
        Ok(Inflated {
            header,
            stream,
            block_sizes,
        })
    }

    /// Inflate a packed object's payload.
    pub fn decode_pack(&self, payload: &[u8], offset: usize) -> Result<Vec<u8>> {
        if payload.len() < PACK_PREAMBLE_LEN {
            return Err(Error::compression(
                offset,
                format!(
                    "Packed object has {} bytes, need at least {}",
                    payload.len(),
                    PACK_PREAMBLE_LEN
                ),
            ));
        }
        self.inflate(&payload[PACK_PREAMBLE_LEN..], offset + PACK_PREAMBLE_LEN)
    }

    /// Inflate one zlib stream. Bytes after the end of the stream are ignored.
    pub fn inflate(&self, src: &[u8], offset: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let limit = (self.max_size as u64).saturating_add(1);
        ZlibDecoder::new(src)
            .take(limit)
            .read_to_end(&mut out)
            .map_err(|e| Error::compression(offset, e.to_string()))?;
        if out.len() > self.max_size {
            return Err(Error::LengthTooLong {
                max: self.max_size,
                actual: out.len(),
            });
        }
        Ok(out)
    }

    /// Build a `cmpr` content region from an already-indexed stream and its block-size table.
    pub fn encode(stream: &[u8], block_sizes: &[u32]) -> Result<Vec<u8>> {
        let main = deflate(stream)?;
        let mut table = vec![0u8; block_sizes.len() * 4];
        LittleEndian::write_u32_into(block_sizes, &mut table);
        let table = deflate(&table)?;

        let mut content = Vec::with_capacity(CMPR_HEADER_LEN + main.len() + table.len());
        content.extend_from_slice(&(main.len() as u32).to_le_bytes());
        content.extend_from_slice(&(stream.len() as u32).to_le_bytes());
        content.extend_from_slice(&(table.len() as u32).to_le_bytes());
        content.extend_from_slice(&[0u8; 12]);
        content.extend_from_slice(&main);
        content.extend_from_slice(&table);
        Ok(content)
    }

    /// Build a complete `LIST`/`cmpr` chunk, pad byte included, from a plain chunk stream.
    pub fn encode_list(plain: &[u8], endian: Endian) -> Result<Vec<u8>> {
        let (stream, block_sizes) = to_indexed(plain, endian)?;
        let content = Self::encode(&stream, &block_sizes)?;
        let length = content.len() + 4;
        let mut chunk = Vec::with_capacity(HEADER_LEN + length + 1);
        chunk.extend_from_slice(Tag::LIST.as_bytes());
        chunk.extend_from_slice(&endian.u32_bytes(length as u32));
        chunk.extend_from_slice(Tag::CMPR.as_bytes());
        chunk.extend_from_slice(&content);
        if length & 1 == 1 {
            chunk.push(0);
        }
        Ok(chunk)
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;
    Ok(enc.finish()?)
}

/// Rewrite a plain chunk stream so that every length field becomes an index into a block-size
/// table, returning the rewritten stream and the table.
///
/// The stream must be well formed: every chunk has a valid header and fits in its parent.
pub fn to_indexed(plain: &[u8], endian: Endian) -> Result<(Vec<u8>, Vec<u32>)> {
    let mut out = plain.to_vec();
    let mut sizes = Vec::new();
    index_region(&mut out, 0, plain.len(), endian, &mut sizes)?;
    Ok((out, sizes))
}

fn index_region(
    buf: &mut [u8],
    mut pos: usize,
    end: usize,
    endian: Endian,
    sizes: &mut Vec<u32>,
) -> Result<()> {
    while pos < end {
        if end - pos < HEADER_LEN {
            return Err(Error::ambiguity(pos, "Chunk header runs past end of stream"));
        }
        let length = endian.read_u32(&buf[pos + 4..pos + 8]);
        let body = length as usize + (length as usize & 1);
        let next = pos + HEADER_LEN + body;
        if next > end {
            return Err(Error::ambiguity(pos, "Chunk runs past end of stream"));
        }
        endian.write_u32(&mut buf[pos + 4..pos + 8], sizes.len() as u32);
        sizes.push(length);
        if buf[pos..pos + 4] == *Tag::LIST.as_bytes() {
            if body < 4 {
                return Err(Error::ambiguity(pos, "List too short for its sub-tag"));
            }
            index_region(buf, pos + 12, next, endian, sizes)?;
        }
        pos = next;
    }
    Ok(())
}
