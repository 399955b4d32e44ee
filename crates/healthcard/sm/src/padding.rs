//! ISO/IEC 9797-1 padding method 2
//!
//! A single `0x80` byte followed by zeros up to the next block boundary. Block
//! aligned input still gains a full block.

use bytes::{Bytes, BytesMut};
use cipher::block_padding::{Iso7816, RawPadding};

use crate::{Error, Result};

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Pad everything in `buf` from `start` onwards in place
pub fn pad_in_place(buf: &mut BytesMut, start: usize, block_size: usize) -> Result<()> {
    if block_size == 0 {
        return Err(Error::Encoding("block size must be non-zero"));
    }
    let tail = buf.len().saturating_sub(start) % block_size;
    let padded_len = buf.len() - tail + block_size;
    buf.resize(padded_len, 0);
    Iso7816::raw_pad(&mut buf[padded_len - block_size..], tail);
    Ok(())
}

/// Pad `data` to a multiple of `block_size`
pub fn pad(data: &[u8], block_size: usize) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(data.len() + block_size);
    buf.extend_from_slice(data);
    pad_in_place(&mut buf, 0, block_size)?;
    Ok(buf.freeze())
}

/// Strip the padding from `data`
///
/// The input must be a non-empty multiple of `block_size` and the marker must
/// sit in the last block.
pub fn unpad(data: &[u8], block_size: usize) -> Result<&[u8]> {
    if block_size == 0 || data.is_empty() || data.len() % block_size != 0 {
        return Err(Error::Encoding("padded data is not block aligned"));
    }
    let last_block = data.len() - block_size;
    let kept = Iso7816::raw_unpad(&data[last_block..])
        .map_err(|_| Error::Encoding("invalid padding"))?
        .len();
    Ok(&data[..last_block + kept])
}
