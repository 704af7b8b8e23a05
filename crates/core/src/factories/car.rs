//! CAR v1 stream codec.
//!
//! A CAR v1 stream is a varint length-prefixed DAG-CBOR header followed
//! by varint length-prefixed sections, each section being a binary cid
//! immediately followed by the block bytes. [CarReader] accepts the
//! stream in chunks of any size and hands back blocks as soon as their
//! section is complete. The header is skipped, not interpreted; the
//! HTTP retriever checks the first block against the requested root
//! instead. [verify_block] checks block bytes against their cid.

use bytes::{Buf, Bytes, BytesMut};
use lassie_api::*;
use prost::encoding::{decode_varint, encode_varint};
use sha2::{Digest, Sha256};

/// Content type of a CAR response.
pub const CAR_CONTENT_TYPE: &str = "application/vnd.ipld.car";

/// Sanity limit on a single header or section.
const MAX_SECTION_LEN: u64 = 4 * 1024 * 1024;

/// Longest encoding of a u64 varint.
const MAX_VARINT_LEN: usize = 10;

/// Read the varint at the start of `buf`. Returns `None` if `buf` ends
/// before the varint does, otherwise the value and its encoded length.
fn peek_varint(buf: &[u8]) -> LassieResult<Option<(u64, usize)>> {
    let Some(end) =
        buf.iter().take(MAX_VARINT_LEN).position(|b| b & 0x80 == 0)
    else {
        if buf.len() < MAX_VARINT_LEN {
            return Ok(None);
        }
        return Err(LassieError::other("car varint too long"));
    };
    let mut slice = &buf[..=end];
    let value = decode_varint(&mut slice)
        .map_err(|err| LassieError::other_src("invalid car varint", err))?;
    Ok(Some((value, end + 1)))
}

/// Multihash code of sha2-256.
const SHA2_256: u64 = 0x12;

/// Multihash code of the identity hash, whose digest is the data itself.
const IDENTITY: u64 = 0x00;

/// Where the multihash of a binary cid sits.
#[derive(Debug)]
struct CidLayout {
    hash: u64,
    digest: std::ops::Range<usize>,
}

/// Parse the binary cid at the start of `section`.
///
/// CIDv0 is a bare sha2-256 multihash. CIDv1 is
/// `<version><codec><multihash code><digest length><digest>`.
fn cid_layout(section: &[u8]) -> LassieResult<CidLayout> {
    let layout = if section.len() >= 2
        && section[0] == SHA2_256 as u8
        && section[1] == 0x20
    {
        CidLayout {
            hash: SHA2_256,
            digest: 2..34,
        }
    } else {
        let mut cur = section;
        let mut next = |what: &str| {
            decode_varint(&mut cur).map_err(|err| {
                LassieError::other_src(format!("invalid cid {what}"), err)
            })
        };
        let version = next("version")?;
        if version != 1 {
            return Err(LassieError::other(format!(
                "unsupported cid version {version}"
            )));
        }
        let _codec = next("codec")?;
        let hash = next("multihash code")?;
        let digest_len = next("digest length")? as usize;

        let start = section.len() - cur.len();
        CidLayout {
            hash,
            digest: start..start.saturating_add(digest_len),
        }
    };

    if layout.digest.end > section.len() {
        return Err(LassieError::other("car section shorter than its cid"));
    }
    Ok(layout)
}

/// The length of the binary cid at the start of `section`.
fn cid_len(section: &[u8]) -> LassieResult<usize> {
    Ok(cid_layout(section)?.digest.end)
}

/// Check the bytes of `block` against the multihash in its cid.
///
/// Only sha2-256 and identity multihashes are understood. Any other
/// hash function is an error, since the block cannot be verified.
pub fn verify_block(block: &Block) -> LassieResult<()> {
    let cid: &[u8] = &block.cid;
    let layout = cid_layout(cid)?;
    if layout.digest.end != cid.len() {
        return Err(LassieError::other(format!(
            "trailing bytes after the multihash of {}",
            block.cid
        )));
    }

    let digest = &cid[layout.digest];
    let valid = match layout.hash {
        SHA2_256 => Sha256::digest(&block.data)[..] == *digest,
        IDENTITY => block.data[..] == *digest,
        hash => {
            return Err(LassieError::other(format!(
                "unsupported multihash 0x{hash:x} in {}",
                block.cid
            )))
        }
    };
    if !valid {
        return Err(LassieError::other(format!(
            "block data does not match {}",
            block.cid
        )));
    }
    Ok(())
}

/// Incremental CAR v1 reader.
#[derive(Debug, Default)]
pub struct CarReader {
    buf: BytesMut,
    header_done: bool,
    blocks: u64,
}

impl CarReader {
    /// Construct a reader expecting the start of a stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next chunk of the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of blocks read so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Split the next complete frame off the buffer, if there is one.
    fn next_frame(&mut self) -> LassieResult<Option<Bytes>> {
        let Some((len, prefix)) = peek_varint(&self.buf)? else {
            return Ok(None);
        };
        if len == 0 || len > MAX_SECTION_LEN {
            return Err(LassieError::other(format!(
                "invalid car frame length {len}"
            )));
        }
        let len = len as usize;
        if self.buf.len() < prefix + len {
            return Ok(None);
        }
        self.buf.advance(prefix);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// The next complete block, or `None` if more data is needed.
    pub fn next_block(&mut self) -> LassieResult<Option<Block>> {
        if !self.header_done {
            if self.next_frame()?.is_none() {
                return Ok(None);
            }
            self.header_done = true;
        }

        let Some(section) = self.next_frame()? else {
            return Ok(None);
        };
        let split = cid_len(&section)?;
        self.blocks += 1;
        Ok(Some(Block::new(
            section.slice(..split).into(),
            section.slice(split..),
        )))
    }

    /// Call at the end of the stream. Errors if the stream was truncated.
    pub fn finish(&self) -> LassieResult<()> {
        if !self.header_done {
            return Err(LassieError::other("car stream ended before header"));
        }
        if !self.buf.is_empty() {
            return Err(LassieError::other(format!(
                "car stream ended inside a section ({} bytes left)",
                self.buf.len()
            )));
        }
        Ok(())
    }
}

fn cbor_head(major: u8, len: usize, out: &mut Vec<u8>) {
    let major = major << 5;
    match len {
        0..=23 => out.push(major | len as u8),
        24..=0xff => out.extend_from_slice(&[major | 24, len as u8]),
        0x100..=0xffff => {
            out.push(major | 25);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            out.push(major | 26);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
    }
}

/// Encode a CAR v1 stream holding `blocks` with the given `roots`.
pub fn write_car(roots: &[Cid], blocks: &[Block]) -> Bytes {
    // DAG-CBOR {"roots": [cid, ..], "version": 1}
    let mut header = Vec::new();
    cbor_head(5, 2, &mut header);
    cbor_head(3, 5, &mut header);
    header.extend_from_slice(b"roots");
    cbor_head(4, roots.len(), &mut header);
    for root in roots {
        // tag 42, bytes with the identity multibase prefix
        header.extend_from_slice(&[0xd8, 42]);
        cbor_head(2, root.len() + 1, &mut header);
        header.push(0);
        header.extend_from_slice(root);
    }
    cbor_head(3, 7, &mut header);
    header.extend_from_slice(b"version");
    cbor_head(0, 1, &mut header);

    let mut out = BytesMut::new();
    encode_varint(header.len() as u64, &mut out);
    out.extend_from_slice(&header);
    for block in blocks {
        encode_varint((block.cid.len() + block.data.len()) as u64, &mut out);
        out.extend_from_slice(&block.cid);
        out.extend_from_slice(&block.data);
    }
    out.freeze()
}
