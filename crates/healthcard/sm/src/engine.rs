//! Secure messaging encrypt/decrypt pipeline
//!
//! Stateless functions over session keys and a borrowed sequence counter.
//! [`crate::Session`] wraps them with lifecycle tracking.
//!
//! A protected command is the original header with the secure messaging class
//! bits set, followed by the data objects
//!
//! ```text
//! [87 L 01 || AES-CBC(pad(data))] [97 L Le] 8E 08 MAC
//! ```
//!
//! where the MAC is AES-CMAC over `SSC || pad(header) || pad(objects)`
//! truncated to eight bytes, and the CBC IV is the AES encryption of the SSC.
//! Responses carry `[87|81] 99 8E` with the MAC over `SSC || pad(objects)`.

use bytes::{BufMut, Bytes, BytesMut};
use healthcard_apdu_core::command::{EXTENDED_MAX_LC, LE_WILDCARD, SHORT_MAX_LC, SHORT_MAX_LE};
use healthcard_apdu_core::{Command, Response, StatusWord, utils};
use tracing::{trace, warn};

use crate::counter::SequenceCounter;
use crate::crypto::{self, Block};
use crate::keys::SessionKeys;
use crate::padding::{BLOCK_SIZE, pad_in_place, unpad};
use crate::tlv::{self, MAC_LEN, PADDING_INDICATOR, Tag, TaggedObject};
use crate::{Error, Result};

/// Class byte bits indicating secure messaging with an authenticated header
pub const SM_CLASS_BITS: u8 = 0x0C;

/// A protected command ready for serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireCommand {
    /// CLA INS P1 P2 with the secure messaging class bits set
    pub header: [u8; 4],
    /// Data objects in wire order, ending with the MAC
    pub objects: Vec<TaggedObject>,
    /// The plain command asked for more than 255 response bytes
    pub extended: bool,
}

impl WireCommand {
    /// Concatenated encoded objects
    pub fn body(&self) -> Result<Bytes> {
        tlv::encode_all(&self.objects)
    }

    /// Get the first object with the given tag
    pub fn object(&self, tag: Tag) -> Option<&TaggedObject> {
        self.objects.iter().find(|o| o.tag == tag)
    }

    /// The protected command as a plain APDU with a wildcard Le
    pub fn to_command(&self) -> Result<Command> {
        let [cla, ins, p1, p2] = self.header;
        Ok(Command::new_with_data_and_le(
            cla,
            ins,
            p1,
            p2,
            self.body()?,
            LE_WILDCARD,
        ))
    }

    /// Serialize to raw APDU bytes
    ///
    /// Short form unless the body exceeds 255 bytes or the plain command
    /// expected more than 255 bytes. Extended form is an encoding error when
    /// `allow_extended` is false.
    pub fn to_bytes(&self, allow_extended: bool) -> Result<Bytes> {
        let command = self.to_command()?;
        let body_len = command.payload().map_or(0, <[u8]>::len);
        if body_len > EXTENDED_MAX_LC {
            return Err(Error::Encoding("protected command too long"));
        }

        let extended = self.extended || body_len > SHORT_MAX_LC;
        if extended && !allow_extended {
            return Err(Error::Encoding("extended length not enabled"));
        }

        Ok(if extended {
            command.to_extended_bytes()
        } else {
            command.to_bytes()
        })
    }
}

/// A parsed protected response
///
/// Structure is validated on parsing; the MAC is checked by [`decrypt`].
/// Parsed objects are read-only; [`decrypt`] derives its output from the
/// MAC-covered bytes alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    /// Data objects in wire order, ending with the MAC
    objects: Vec<TaggedObject>,
    /// Transport status word following the objects
    trailer: StatusWord,
    /// Encoded objects covered by the MAC
    authenticated: Bytes,
}

fn protocol(error: Error) -> Error {
    match error {
        Error::Encoding(message) => Error::Protocol(message),
        other => other,
    }
}

impl WireResponse {
    /// Parse raw response bytes: objects followed by SW1 SW2
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let (trailer, body) = utils::extract_status_and_payload(raw)
            .map_err(|_| Error::Protocol("response shorter than a status word"))?;

        if body.is_empty() {
            return Err(if trailer.is_success() {
                Error::Protocol("missing MAC")
            } else if trailer.is_secure_messaging_error() {
                warn!(status = %trailer, "Card rejected secure messaging objects");
                Error::Protocol("card rejected secure messaging objects")
            } else {
                Error::Protocol("unprotected error status")
            });
        }

        let mut objects: Vec<TaggedObject> = Vec::with_capacity(3);
        let mut authenticated = BytesMut::with_capacity(body.len());
        let mut seen_mac = false;

        for item in tlv::decode(body) {
            let raw = item.map_err(protocol)?;
            if seen_mac {
                return Err(Error::Protocol("object after MAC"));
            }

            match raw.tag {
                Tag::Length => return Err(Error::Protocol("length object in response")),
                Tag::Mac if raw.value.len() != MAC_LEN => {
                    return Err(Error::Protocol("MAC object must be 8 bytes"));
                }
                Tag::Mac => seen_mac = true,
                _ => authenticated.put_slice(raw.encoded),
            }

            let duplicate = objects
                .iter()
                .any(|o| o.tag == raw.tag || (o.tag.is_data() && raw.tag.is_data()));
            if duplicate {
                return Err(Error::Protocol("duplicate data object"));
            }
            objects.push(TaggedObject::from(raw));
        }

        if !seen_mac {
            return Err(Error::Protocol("missing MAC"));
        }

        trace!(
            objects = objects.len(),
            trailer = %trailer,
            "Parsed protected response"
        );

        Ok(Self {
            objects,
            trailer,
            authenticated: authenticated.freeze(),
        })
    }

    /// Parsed objects in wire order, ending with the MAC
    pub fn objects(&self) -> &[TaggedObject] {
        &self.objects
    }

    /// Transport status word following the objects
    pub const fn trailer(&self) -> StatusWord {
        self.trailer
    }

    /// Get the object with the given tag
    pub fn object(&self, tag: Tag) -> Option<&TaggedObject> {
        self.objects.iter().find(|o| o.tag == tag)
    }

    /// Get the data object, encrypted or not
    pub fn data_object(&self) -> Option<&TaggedObject> {
        self.objects.iter().find(|o| o.tag.is_data())
    }

    /// Get the MAC value
    pub fn mac(&self) -> Option<&[u8]> {
        self.object(Tag::Mac).map(|o| o.value.as_ref())
    }

    /// Re-encode to raw response bytes
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        for object in &self.objects {
            object.encode_into(&mut buf)?;
        }
        buf.put_slice(&self.trailer.to_bytes());
        Ok(buf.freeze())
    }
}

/// A verified and decrypted response
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PlainResponse {
    /// Response data, empty when the card returned none
    pub data: Bytes,
    /// Status word from the protected status object
    pub status: StatusWord,
}

impl PlainResponse {
    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert to a plain APDU response
    pub fn to_response(&self) -> Response {
        Response::new(Some(self.data.clone()), self.status)
    }
}

impl From<PlainResponse> for Response {
    fn from(response: PlainResponse) -> Self {
        Self::new(Some(response.data), response.status)
    }
}

/// Compute the truncated command MAC: `SSC || pad(header) || pad(objects)`
fn command_mac(
    keys: &SessionKeys,
    ssc: &Block,
    header: &[u8; 4],
    objects: &[TaggedObject],
) -> Result<[u8; MAC_LEN]> {
    let mut input = BytesMut::with_capacity(4 * BLOCK_SIZE);
    input.put_slice(header);
    pad_in_place(&mut input, 0, BLOCK_SIZE)?;

    if !objects.is_empty() {
        let start = input.len();
        for object in objects {
            object.encode_into(&mut input)?;
        }
        pad_in_place(&mut input, start, BLOCK_SIZE)?;
    }

    crypto::truncated_cmac(keys.mac(), &[&ssc[..], &input[..]])
}

/// Protect a plain command
///
/// Increments the counter once, before anything is derived from it.
pub fn encrypt(
    command: &Command,
    keys: &SessionKeys,
    counter: &mut SequenceCounter,
) -> Result<WireCommand> {
    if command.cla & SM_CLASS_BITS != 0 {
        return Err(Error::Encoding("class byte already indicates secure messaging"));
    }
    let data = command.payload().unwrap_or_default();
    if data.len() > EXTENDED_MAX_LC {
        return Err(Error::Encoding("command data too long"));
    }

    counter.increment()?;
    let ssc = counter.to_bytes();
    trace!(ssc = %counter, "Protecting command");

    let mut objects = Vec::with_capacity(3);

    if !data.is_empty() {
        let mut cryptogram = BytesMut::from(data);
        pad_in_place(&mut cryptogram, 0, BLOCK_SIZE)?;
        let iv = crypto::derive_iv(keys.enc(), &ssc)?;
        crypto::cbc_encrypt(keys.enc(), &iv, &mut cryptogram)?;
        objects.push(TaggedObject::data(&cryptogram, true));
    }

    if let Some(le) = command.le {
        objects.push(TaggedObject::length(le));
    }

    let header = [
        command.cla | SM_CLASS_BITS,
        command.ins,
        command.p1,
        command.p2,
    ];
    let mac = command_mac(keys, &ssc, &header, &objects)?;
    objects.push(TaggedObject::mac(mac));

    Ok(WireCommand {
        header,
        objects,
        extended: command.le.is_some_and(|le| le > SHORT_MAX_LE),
    })
}

fn decrypt_data(value: &[u8], keys: &SessionKeys, ssc: &Block) -> Result<Bytes> {
    let (&indicator, cryptogram) = value
        .split_first()
        .ok_or(Error::Protocol("empty data object"))?;
    if indicator != PADDING_INDICATOR {
        return Err(Error::Protocol("unsupported padding indicator"));
    }
    if cryptogram.is_empty() || cryptogram.len() % BLOCK_SIZE != 0 {
        return Err(Error::Protocol("cryptogram is not block aligned"));
    }

    let iv = crypto::derive_iv(keys.enc(), ssc)?;
    let mut buf = BytesMut::from(cryptogram);
    crypto::cbc_decrypt(keys.enc(), &iv, &mut buf)?;
    let len = unpad(&buf, BLOCK_SIZE)?.len();
    buf.truncate(len);
    Ok(buf.freeze())
}

/// Verify and decrypt a protected response
///
/// Increments the counter once, then checks the MAC before touching any
/// other object.
pub fn decrypt(
    response: &WireResponse,
    keys: &SessionKeys,
    counter: &mut SequenceCounter,
) -> Result<PlainResponse> {
    counter.increment()?;
    let ssc = counter.to_bytes();
    trace!(ssc = %counter, "Verifying response");

    let mac = response.mac().ok_or(Error::Protocol("missing MAC"))?;
    let mut input = BytesMut::from(&response.authenticated[..]);
    if !input.is_empty() {
        pad_in_place(&mut input, 0, BLOCK_SIZE)?;
    }
    if let Err(error) = crypto::verify_cmac(keys.mac(), &[&ssc[..], &input[..]], mac) {
        warn!("MAC verification failed for secure messaging response");
        return Err(error);
    }

    // Re-read the objects from the bytes the MAC was checked over
    let mut data_object = None;
    let mut status_object = None;
    for item in tlv::decode(&response.authenticated) {
        let raw = item.map_err(protocol)?;
        match raw.tag {
            Tag::Status => status_object = Some(raw.value),
            Tag::DataPlain | Tag::DataAlt => data_object = Some((raw.tag, raw.value)),
            Tag::Length | Tag::Mac => {
                return Err(Error::Protocol("unexpected authenticated object"));
            }
        }
    }

    let data = match data_object {
        Some((Tag::DataPlain, value)) => decrypt_data(value, keys, &ssc)?,
        Some((_, value)) => Bytes::copy_from_slice(value),
        None => Bytes::new(),
    };

    let status = match status_object {
        Some(&[sw1, sw2]) => StatusWord::new(sw1, sw2),
        Some(_) => return Err(Error::Protocol("status object must be 2 bytes")),
        None => return Err(Error::Protocol("missing status object")),
    };

    if status != response.trailer {
        warn!(
            protected = %status,
            trailer = %response.trailer,
            "Protected status word differs from response trailer"
        );
    }

    Ok(PlainResponse { data, status })
}
