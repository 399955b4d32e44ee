//! Simulated health card for secure messaging tests
//!
//! The card side is written directly against the `aes`, `cbc` and `cmac`
//! crates so it does not share code with the host implementation.

#![allow(dead_code, unreachable_pub)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use aes::Aes128;
use bytes::Bytes;
use cipher::{
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::NoPadding, generic_array::GenericArray,
};
use cmac::{Cmac, Mac};
use healthcard_apdu_core::{CardTransport, TransportError};
use parking_lot::Mutex;

pub const ENC_KEY: [u8; 16] = [
    0x68, 0x40, 0x6B, 0x41, 0x62, 0xE3, 0x2C, 0xE3, 0x5A, 0x8C, 0x25, 0x2B, 0x54, 0x74, 0x4A, 0x1B,
];
pub const MAC_KEY: [u8; 16] = [
    0x73, 0xFF, 0x26, 0x8C, 0x0A, 0x63, 0x97, 0x5A, 0x17, 0x7F, 0x2E, 0x3E, 0x5B, 0x36, 0x78, 0x10,
];

/// Application behaviour of the card: plain command in, plain data and status out
pub type Handler = Box<dyn FnMut(&PlainCommand) -> (Vec<u8>, [u8; 2]) + Send>;

/// Hook applied to each protected response before it leaves the card
pub type Tamper = Box<dyn FnMut(&mut Vec<u8>) + Send>;

/// A command as the card application sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainCommand {
    pub header: [u8; 4],
    pub data: Vec<u8>,
    pub le: Option<Vec<u8>>,
}

/// What the card observed, shared with the test
#[derive(Debug, Default)]
pub struct CardLog {
    /// Raw protected commands as received
    pub wire_commands: Vec<Bytes>,
    /// Raw protected responses as sent
    pub wire_responses: Vec<Bytes>,
    /// Decrypted commands
    pub commands: Vec<PlainCommand>,
    /// Number of send calls
    pub sends: usize,
    /// Number of receive calls
    pub receives: usize,
}

pub struct SimulatedCard {
    ssc: u128,
    handler: Handler,
    tamper: Option<Tamper>,
    /// Answer with plain DO81 data instead of DO87
    pub plain_data: bool,
    /// Errors returned by the next receive calls
    pub receive_errors: VecDeque<TransportError>,
    pending: Option<Bytes>,
    log: Arc<Mutex<CardLog>>,
}

impl fmt::Debug for SimulatedCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedCard")
            .field("ssc", &self.ssc)
            .field("plain_data", &self.plain_data)
            .finish()
    }
}

impl SimulatedCard {
    /// Card that answers every command with 90 00 and echoes its data
    pub fn new() -> Self {
        Self::with_handler(Box::new(|command| (command.data.clone(), [0x90, 0x00])))
    }

    pub fn with_handler(handler: Handler) -> Self {
        Self {
            ssc: 0,
            handler,
            tamper: None,
            plain_data: false,
            receive_errors: VecDeque::new(),
            pending: None,
            log: Arc::new(Mutex::new(CardLog::default())),
        }
    }

    pub fn with_tamper(mut self, tamper: Tamper) -> Self {
        self.tamper = Some(tamper);
        self
    }

    pub fn log(&self) -> Arc<Mutex<CardLog>> {
        Arc::clone(&self.log)
    }

    pub const fn ssc(&self) -> u128 {
        self.ssc
    }

    fn process(&mut self, raw: &[u8]) -> Vec<u8> {
        match self.unprotect(raw) {
            Some(command) => {
                self.log.lock().commands.push(command.clone());
                let (data, sw) = (self.handler)(&command);
                self.protect(&data, sw)
            }
            None => vec![0x69, 0x88],
        }
    }

    fn unprotect(&mut self, raw: &[u8]) -> Option<PlainCommand> {
        let (header, body) = split_apdu(raw)?;
        if header[0] & 0x0C != 0x0C {
            return None;
        }

        self.ssc += 1;
        let ssc = self.ssc.to_be_bytes();

        let mut objects = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let (tag, value, encoded_len) = parse_object(rest)?;
            objects.push((tag, value, &rest[..encoded_len]));
            rest = &rest[encoded_len..];
        }

        let (mac_tag, mac, _) = objects.pop()?;
        if mac_tag != 0x8E || mac.len() != 8 {
            return None;
        }

        let mut input = pad(header);
        let covered: Vec<u8> = objects.iter().flat_map(|(_, _, enc)| enc.iter().copied()).collect();
        if !covered.is_empty() {
            input.extend(pad(&covered));
        }
        if cmac(&ssc, &input)[..8] != *mac {
            return None;
        }

        let mut command = PlainCommand {
            header: [header[0] & !0x0C, header[1], header[2], header[3]],
            data: Vec::new(),
            le: None,
        };
        for (tag, value, _) in objects {
            match tag {
                0x87 => {
                    let (&indicator, cryptogram) = value.split_first()?;
                    if indicator != 0x01 {
                        return None;
                    }
                    command.data = cbc_decrypt(&iv(&ssc), cryptogram);
                }
                0x97 => command.le = Some(value.to_vec()),
                _ => return None,
            }
        }
        Some(command)
    }

    fn protect(&mut self, data: &[u8], sw: [u8; 2]) -> Vec<u8> {
        self.ssc += 1;
        let ssc = self.ssc.to_be_bytes();

        let mut body = Vec::new();
        if !data.is_empty() {
            if self.plain_data {
                push_object(&mut body, 0x81, data);
            } else {
                let mut value = vec![0x01];
                value.extend(cbc_encrypt(&iv(&ssc), &pad(data)));
                push_object(&mut body, 0x87, &value);
            }
        }
        push_object(&mut body, 0x99, &sw);

        let mac = cmac(&ssc, &pad(&body));
        push_object(&mut body, 0x8E, &mac[..8]);
        body.extend_from_slice(&sw);
        body
    }
}

impl CardTransport for SimulatedCard {
    fn send(&mut self, command: &[u8]) -> Result<(), TransportError> {
        {
            let mut log = self.log.lock();
            log.sends += 1;
            log.wire_commands.push(Bytes::copy_from_slice(command));
        }
        let mut response = self.process(command);
        if let Some(tamper) = self.tamper.as_mut() {
            tamper(&mut response);
        }
        self.log.lock().wire_responses.push(Bytes::from(response.clone()));
        self.pending = Some(Bytes::from(response));
        Ok(())
    }

    fn receive(&mut self) -> Result<Bytes, TransportError> {
        self.log.lock().receives += 1;
        if let Some(error) = self.receive_errors.pop_front() {
            return Err(error);
        }
        self.pending.take().ok_or(TransportError::Transmission)
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.pending = None;
        Ok(())
    }
}

/// Split a case 4 command into header and body, short or extended
pub fn split_apdu(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    let (header, rest) = raw.split_at_checked(4)?;
    match rest {
        [0x00, hi, lo, tail @ ..] if tail.len() >= 2 => {
            let lc = usize::from(u16::from_be_bytes([*hi, *lo]));
            (tail.len() == lc + 2).then(|| (header, &tail[..lc]))
        }
        [lc, tail @ ..] => {
            let lc = usize::from(*lc);
            (tail.len() == lc + 1).then(|| (header, &tail[..lc]))
        }
        [] => None,
    }
}

fn parse_object(data: &[u8]) -> Option<(u8, &[u8], usize)> {
    let (&tag, rest) = data.split_first()?;
    let (len, skip) = match rest {
        [0x81, len, ..] => (usize::from(*len), 2),
        [0x82, hi, lo, ..] => (usize::from(u16::from_be_bytes([*hi, *lo])), 3),
        [len, ..] if *len < 0x80 => (usize::from(*len), 1),
        _ => return None,
    };
    let value = rest.get(skip..skip + len)?;
    Some((tag, value, 1 + skip + len))
}

fn push_object(buf: &mut Vec<u8>, tag: u8, value: &[u8]) {
    buf.push(tag);
    match value.len() {
        len @ 0..=0x7F => buf.push(len as u8),
        len @ 0x80..=0xFF => buf.extend([0x81, len as u8]),
        len => buf.extend([0x82, (len >> 8) as u8, len as u8]),
    }
    buf.extend_from_slice(value);
}

pub fn pad(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    out.push(0x80);
    while out.len() % 16 != 0 {
        out.push(0x00);
    }
    out
}

fn unpad(data: &[u8]) -> Vec<u8> {
    let end = data.iter().rposition(|&b| b == 0x80).unwrap_or(0);
    data[..end].to_vec()
}

fn iv(ssc: &[u8; 16]) -> [u8; 16] {
    let cipher = <Aes128 as KeyInit>::new(GenericArray::from_slice(&ENC_KEY));
    let mut block = GenericArray::clone_from_slice(ssc);
    cipher.encrypt_block(&mut block);
    let mut out = [0u8; 16];
    out.copy_from_slice(&block);
    out
}

fn cbc_encrypt(iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    let len = buf.len();
    let encryptor = <cbc::Encryptor<Aes128> as KeyIvInit>::new(
        GenericArray::from_slice(&ENC_KEY),
        GenericArray::from_slice(iv),
    );
    encryptor.encrypt_padded_mut::<NoPadding>(&mut buf, len).unwrap();
    buf
}

fn cbc_decrypt(iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    let decryptor = <cbc::Decryptor<Aes128> as KeyIvInit>::new(
        GenericArray::from_slice(&ENC_KEY),
        GenericArray::from_slice(iv),
    );
    decryptor.decrypt_padded_mut::<NoPadding>(&mut buf).unwrap();
    unpad(&buf)
}

fn cmac(ssc: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut mac = <Cmac<Aes128> as KeyInit>::new(GenericArray::from_slice(&MAC_KEY));
    mac.update(ssc);
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
