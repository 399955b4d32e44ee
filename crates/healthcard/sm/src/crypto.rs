//! Cryptographic operations for secure messaging
//!
//! Thin adapter over the `aes`, `cbc` and `cmac` crates. Key length selects the
//! cipher: 16, 24 or 32 bytes for AES-128, AES-192 and AES-256.

use aes::{Aes128, Aes192, Aes256};
use cipher::{
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::NoPadding, generic_array::GenericArray,
};
use cmac::{Cmac, Mac};

use crate::padding::BLOCK_SIZE;
use crate::tlv::MAC_LEN;
use crate::{Error, Result};

/// One AES block
pub type Block = [u8; BLOCK_SIZE];

/// Run `$body` with `$aes` bound to the AES variant matching the key length
macro_rules! with_aes {
    ($key:expr, $aes:ident => $body:expr) => {
        match $key.len() {
            16 => {
                type $aes = Aes128;
                $body
            }
            24 => {
                type $aes = Aes192;
                $body
            }
            32 => {
                type $aes = Aes256;
                $body
            }
            _ => Err(Error::Crypto("unsupported AES key length")),
        }
    };
}

/// Whether `len` is a supported AES key length
pub const fn is_valid_key_len(len: usize) -> bool {
    matches!(len, 16 | 24 | 32)
}

/// Encrypt a single block in place (AES-ECB)
pub fn encrypt_block(key: &[u8], block: &mut Block) -> Result<()> {
    with_aes!(key, Aes => {
        let cipher = <Aes as KeyInit>::new_from_slice(key)
            .map_err(|_| Error::Crypto("invalid AES key"))?;
        cipher.encrypt_block(GenericArray::from_mut_slice(block));
        Ok(())
    })
}

/// Derive the CBC initialization vector from the current send sequence counter
pub fn derive_iv(enc_key: &[u8], ssc: &Block) -> Result<Block> {
    let mut iv = *ssc;
    encrypt_block(enc_key, &mut iv)?;
    Ok(iv)
}

fn check_aligned(buf: &[u8]) -> Result<()> {
    if buf.is_empty() || buf.len() % BLOCK_SIZE != 0 {
        return Err(Error::Crypto("data is not block aligned"));
    }
    Ok(())
}

/// Encrypt block aligned data in place with AES-CBC
pub fn cbc_encrypt(key: &[u8], iv: &Block, buf: &mut [u8]) -> Result<()> {
    check_aligned(buf)?;
    let len = buf.len();
    with_aes!(key, Aes => {
        cbc::Encryptor::<Aes>::new_from_slices(key, iv)
            .map_err(|_| Error::Crypto("invalid AES key"))?
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map_err(|_| Error::Crypto("CBC encryption failed"))?;
        Ok(())
    })
}

/// Decrypt block aligned data in place with AES-CBC
pub fn cbc_decrypt(key: &[u8], iv: &Block, buf: &mut [u8]) -> Result<()> {
    check_aligned(buf)?;
    with_aes!(key, Aes => {
        cbc::Decryptor::<Aes>::new_from_slices(key, iv)
            .map_err(|_| Error::Crypto("invalid AES key"))?
            .decrypt_padded_mut::<NoPadding>(buf)
            .map_err(|_| Error::Crypto("CBC decryption failed"))?;
        Ok(())
    })
}

/// AES-CMAC over the concatenation of `parts`
pub fn cmac(key: &[u8], parts: &[&[u8]]) -> Result<Block> {
    with_aes!(key, Aes => {
        let mut mac = <Cmac<Aes> as KeyInit>::new_from_slice(key)
            .map_err(|_| Error::Crypto("invalid AES key"))?;
        for part in parts {
            mac.update(part);
        }
        let mut tag = Block::default();
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    })
}

/// AES-CMAC truncated to the secure messaging MAC length
pub fn truncated_cmac(key: &[u8], parts: &[&[u8]]) -> Result<[u8; MAC_LEN]> {
    let full = cmac(key, parts)?;
    let mut tag = [0u8; MAC_LEN];
    tag.copy_from_slice(&full[..MAC_LEN]);
    Ok(tag)
}

/// Verify a truncated AES-CMAC in constant time
pub fn verify_cmac(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<()> {
    if tag.len() != MAC_LEN {
        return Err(Error::MacVerification);
    }
    with_aes!(key, Aes => {
        let mut mac = <Cmac<Aes> as KeyInit>::new_from_slice(key)
            .map_err(|_| Error::Crypto("invalid AES key"))?;
        for part in parts {
            mac.update(part);
        }
        mac.verify_truncated_left(tag)
            .map_err(|_| Error::MacVerification)
    })
}
