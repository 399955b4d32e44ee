//! Secure messaging data objects
//!
//! Each object is a single tag byte, a BER length and the raw value. Only the
//! tags used by secure messaging are accepted; anything else is an encoding
//! error.

use bytes::{BufMut, Bytes, BytesMut};
use healthcard_apdu_core::StatusWord;

use crate::{Error, Result};

/// Padding-content indicator for ISO/IEC 9797-1 method 2 padded cryptograms
pub const PADDING_INDICATOR: u8 = 0x01;

/// Length of the truncated MAC carried in [`Tag::Mac`]
pub const MAC_LEN: usize = 8;

/// Largest value length expressible with the supported length forms
pub const MAX_VALUE_LEN: usize = 0xFFFF;

/// Tag of a secure messaging data object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[repr(u8)]
pub enum Tag {
    /// Padding indicator followed by the cryptogram (DO87)
    #[display("DO87")]
    DataPlain = 0x87,
    /// Plain value, MAC-protected only (DO81)
    #[display("DO81")]
    DataAlt = 0x81,
    /// Expected response length (DO97)
    #[display("DO97")]
    Length = 0x97,
    /// Processing status (DO99)
    #[display("DO99")]
    Status = 0x99,
    /// Cryptographic checksum (DO8E)
    #[display("DO8E")]
    Mac = 0x8E,
}

impl Tag {
    /// The tag byte on the wire
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Whether this tag carries response or command data
    pub const fn is_data(self) -> bool {
        matches!(self, Self::DataPlain | Self::DataAlt)
    }
}

impl TryFrom<u8> for Tag {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x87 => Ok(Self::DataPlain),
            0x81 => Ok(Self::DataAlt),
            0x97 => Ok(Self::Length),
            0x99 => Ok(Self::Status),
            0x8E => Ok(Self::Mac),
            _ => Err(Error::Encoding("unknown secure messaging tag")),
        }
    }
}

/// An owned secure messaging data object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedObject {
    /// Object tag
    pub tag: Tag,
    /// Raw value
    pub value: Bytes,
}

impl TaggedObject {
    /// Create an object from a tag and value
    pub fn new(tag: Tag, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Data object.
    ///
    /// With `encrypted` set, `value` is a cryptogram and the result is a
    /// [`Tag::DataPlain`] object prefixed with the padding indicator. Otherwise
    /// the value is carried as is in a [`Tag::DataAlt`] object.
    pub fn data(value: &[u8], encrypted: bool) -> Self {
        if encrypted {
            let mut buf = BytesMut::with_capacity(value.len() + 1);
            buf.put_u8(PADDING_INDICATOR);
            buf.put_slice(value);
            Self::new(Tag::DataPlain, buf.freeze())
        } else {
            Self::new(Tag::DataAlt, Bytes::copy_from_slice(value))
        }
    }

    /// Expected length object: `0` as `00`, up to 255 in one byte, otherwise two bytes
    pub fn length(le: u16) -> Self {
        match u8::try_from(le) {
            Ok(short) => Self::new(Tag::Length, vec![short]),
            Err(_) => Self::new(Tag::Length, le.to_be_bytes().to_vec()),
        }
    }

    /// Status object carrying SW1 SW2
    pub fn status(status: StatusWord) -> Self {
        Self::new(Tag::Status, status.to_bytes().to_vec())
    }

    /// Cryptographic checksum object
    pub fn mac(value: [u8; MAC_LEN]) -> Self {
        Self::new(Tag::Mac, value.to_vec())
    }

    /// Length of the encoded object
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(1 + length_octets(self.value.len())? + self.value.len())
    }

    /// Append the encoded object to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(self.encoded_len()?);
        buf.put_u8(self.tag.byte());
        encode_length(self.value.len(), buf)?;
        buf.put_slice(&self.value);
        Ok(())
    }

    /// Encode the object
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }
}

impl From<RawObject<'_>> for TaggedObject {
    fn from(raw: RawObject<'_>) -> Self {
        Self::new(raw.tag, Bytes::copy_from_slice(raw.value))
    }
}

/// Number of octets needed to encode `len`
fn length_octets(len: usize) -> Result<usize> {
    match len {
        0..=0x7F => Ok(1),
        0x80..=0xFF => Ok(2),
        0x100..=MAX_VALUE_LEN => Ok(3),
        _ => Err(Error::Encoding("object value too long")),
    }
}

/// Append a BER length to `buf`
pub fn encode_length(len: usize, buf: &mut BytesMut) -> Result<()> {
    match len {
        0..=0x7F => buf.put_u8(len as u8),
        0x80..=0xFF => {
            buf.put_u8(0x81);
            buf.put_u8(len as u8);
        }
        0x100..=MAX_VALUE_LEN => {
            buf.put_u8(0x82);
            buf.put_u16(len as u16);
        }
        _ => return Err(Error::Encoding("object value too long")),
    }
    Ok(())
}

/// Encode a sequence of objects back to back
pub fn encode_all<'a>(objects: impl IntoIterator<Item = &'a TaggedObject>) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    for object in objects {
        object.encode_into(&mut buf)?;
    }
    Ok(buf.freeze())
}

/// A borrowed view of one decoded object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawObject<'a> {
    /// Object tag
    pub tag: Tag,
    /// Raw value
    pub value: &'a [u8],
    /// The complete encoding: tag, length and value
    pub encoded: &'a [u8],
}

/// Iterator over the objects in a byte slice
///
/// Yields an error and then stops at the first malformed object.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

/// Decode the objects in `data`
pub const fn decode(data: &[u8]) -> Decoder<'_> {
    Decoder {
        data,
        pos: 0,
        failed: false,
    }
}

impl<'a> Decoder<'a> {
    fn read_object(&mut self) -> Result<RawObject<'a>> {
        let data = self.data;
        let start = self.pos;
        let rest = &data[start..];

        let (&tag_byte, rest) = rest
            .split_first()
            .ok_or(Error::Encoding("missing tag"))?;
        let tag = Tag::try_from(tag_byte)?;

        let (len, header_len) = match rest {
            [first, ..] if *first < 0x80 => (usize::from(*first), 1),
            [0x81, len, ..] => (usize::from(*len), 2),
            [0x82, hi, lo, ..] => (usize::from(u16::from_be_bytes([*hi, *lo])), 3),
            [0x81] | [0x82, ..] => return Err(Error::Encoding("truncated length")),
            [] => return Err(Error::Encoding("truncated length")),
            _ => return Err(Error::Encoding("unsupported length form")),
        };

        let value_start = start + 1 + header_len;
        let end = value_start
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or(Error::Encoding("value runs past end of data"))?;

        self.pos = end;
        Ok(RawObject {
            tag,
            value: &data[value_start..end],
            encoded: &data[start..end],
        })
    }
}

impl<'a> Iterator for Decoder<'a> {
    type Item = Result<RawObject<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let item = self.read_object();
        self.failed = item.is_err();
        Some(item)
    }
}
