//! Handling of messages/frames

pub mod rx;
pub mod tx;
mod tx_event;

pub use tx_event::TxEvent;

use crate::messageram::{MessageElement, PAYLOAD_WORDS};
use embedded_can::{ExtendedId, StandardId};
use fdcan_core::CanId;

/// Largest payload of an FD frame
pub const MAX_PAYLOAD: usize = 64;

/// Data does not fit in the frame format
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TooMuchData;

/// Header words shared by Rx elements, Tx elements and Tx events
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Header(pub [u32; 2]);

impl Header {
    pub(crate) fn read(words: &[crate::messageram::Word; 2]) -> Self {
        Self([words[0].get(), words[1].get()])
    }

    /// Composite id carrying the XTD and FDF flags in bits 31 and 30
    pub(crate) fn can_id(&self) -> CanId {
        let id = if self.is_extended() {
            CanId((self.0[0] & ExtendedId::MAX.as_raw()) | CanId::EXTENDED)
        } else {
            CanId((self.0[0] >> 18) & StandardId::MAX.as_raw() as u32)
        };
        if self.fd_format() {
            id.with_fd()
        } else {
            id
        }
    }

    pub(crate) fn is_extended(&self) -> bool {
        self.0[0] & (1 << 30) != 0 // XTD
    }

    pub(crate) fn is_remote_frame(&self) -> bool {
        self.0[0] & (1 << 29) != 0 // RTR
    }

    pub(crate) fn dlc(&self) -> u8 {
        ((self.0[1] >> 16) & 0xf) as u8
    }

    pub(crate) fn fd_format(&self) -> bool {
        self.0[1] & (1 << 21) != 0 // FDF
    }

    pub(crate) fn timestamp(&self) -> u16 {
        self.0[1] as u16
    }
}

/// Finds the smallest data length code that encodes at least len bytes
pub fn len_to_dlc(len: usize, fd_format: bool) -> Result<u8, TooMuchData> {
    if fd_format {
        match len {
            0..=8 => Ok(len as u8),
            9..=12 => Ok(9),
            13..=16 => Ok(10),
            17..=20 => Ok(11),
            21..=24 => Ok(12),
            25..=32 => Ok(13),
            33..=48 => Ok(14),
            49..=64 => Ok(15),
            _ => Err(TooMuchData),
        }
    } else {
        match len {
            0..=8 => Ok(len as u8),
            _ => Err(TooMuchData),
        }
    }
}

/// Converts data length code to a length in bytes
pub fn dlc_to_len(dlc: u8, fd_format: bool) -> usize {
    if fd_format {
        match dlc {
            0..=8 => dlc.into(),
            9 => 12,
            10 => 16,
            11 => 20,
            12 => 24,
            13 => 32,
            14 => 48,
            15.. => 64,
        }
    } else {
        match dlc {
            0..=8 => dlc.into(),
            9.. => 8,
        }
    }
}

/// Number of payload words covering `len` bytes
fn words_for(len: usize) -> usize {
    len.div_ceil(4).min(PAYLOAD_WORDS)
}

fn read_payload(element: &MessageElement, len: usize) -> [u8; MAX_PAYLOAD] {
    let mut data = [0; MAX_PAYLOAD];
    for (chunk, word) in data
        .chunks_exact_mut(4)
        .zip(element.data.iter())
        .take(words_for(len))
    {
        chunk.copy_from_slice(&word.get().to_le_bytes());
    }
    data
}

fn write_payload(element: &MessageElement, data: &[u8; MAX_PAYLOAD], len: usize) {
    for (chunk, word) in data
        .chunks_exact(4)
        .zip(element.data.iter())
        .take(words_for(len))
    {
        word.set(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
}
