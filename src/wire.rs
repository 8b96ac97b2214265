/*!

The chunk container format read and written by riff-pack.

A file is a tree of chunks. Every chunk starts with a 4-byte tag and a 32-bit length field. The
length counts the bytes after the length field itself, not including any pad byte. If the length
is odd, a single pad byte follows the chunk so the next one starts on an even offset. The pad byte
is usually zero, but its value is preserved either way.

# Byte Order

The first tag of the file decides the byte order of every length field:

- `RIFF`: little-endian
- `RIFX`: big-endian

The tables inside a compressed list (see below) are always little-endian.

# Chunk Kinds

## Root

```text
"RIFF" | length: u32 | format: [u8; 4] | chunk*
```

The format tag names the document version: `CDR5` through `CDR9`, `CDRA` through `CDRD`, or
`CMX1`. A root whose length runs past the end of the file is read up to the end of the file.
Anything after the root's declared end is kept as trailing bytes.

## List

```text
"LIST" | length: u32 | sub_tag: [u8; 4] | chunk*
```

The length covers the sub-tag and the content, so it is always at least 4. The chunks inside a
list must add up to exactly its content length.

## Object

```text
tag: [u8; 4] | length: u32 | payload: [u8; length] | pad?
```

The first three bytes of an object tag are ASCII letters or digits; the fourth may be anything,
and is usually a space or NUL for short names (`"bmp "`, `"obj "`). A position where neither a
`LIST` nor a valid object tag is found can't be parsed, and the enclosing list is kept as raw bytes.

# Compressed Lists

A list with the sub-tag `cmpr` holds a compressed chunk stream. Its content is:

```text
compressed_size: u32le | uncompressed_size: u32le | block_table_size: u32le | reserved: [u8; 12]
zlib(stream): [u8; compressed_size]
zlib(block table): rest of content
```

The block table inflates to an array of `u32le` block sizes; a table whose length isn't a
multiple of 4 is malformed. The stream inflates to `uncompressed_size` bytes of ordinary chunks,
with one difference: every length field holds an index into the block table instead of a byte
count. The chunk's real length is the table entry.
Compressed lists do not nest.

On output, a compressed list is written exactly as it was read. Its decoded chunks are available
for reading but are never re-compressed, so they can't be edited.

# Packed Objects

An object whose class is packed holds a 12-byte preamble followed by a zlib stream. The stream
inflates to ordinary chunks with literal lengths. Like compressed lists, packed objects are
written back as their original bytes.

# Container Settings

The `cont` object at the top level of CorelDRAW files states the coordinate size at payload offset
52 (byte 60 of the chunk): `0x32 0x00` for 16-bit coordinates, `0x34 0x00` for 32-bit.

*/
