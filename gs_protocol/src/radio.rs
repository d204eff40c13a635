//! GST radio frame: the fixed 64-byte unit carried over the UHF link.
//!
//! ```text
//! | guid (2) | crc (2) | payload (56) | crc1 (2) | termination (2) |
//! ```
//!
//! Multi-byte fields are little-endian. `crc1` repeats `crc` so a frame
//! whose header was damaged can be told apart from one whose payload was.

use thiserror::Error;

use crate::crc16;

pub const RADIO_FRAME_SIZE: usize = 64;
pub const RADIO_PAYLOAD_SIZE: usize = 56;
pub const RADIO_GUID: u16 = 0x6F35;
pub const RADIO_TERMINATION: [u8; 2] = *b"\r\n";

const GUID_AT: usize = 0;
const CRC_AT: usize = 2;
const PAYLOAD_AT: usize = 4;
const CRC1_AT: usize = PAYLOAD_AT + RADIO_PAYLOAD_SIZE;
const TERM_AT: usize = CRC1_AT + 2;

/// Why a received radio frame was rejected.
///
/// The variants are checked in declaration order, so a short read is
/// always reported as `Incomplete` even if the bytes present are garbage.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioDecodeError {
    #[error("incomplete radio frame: {got} of 64 bytes")]
    Incomplete { got: usize },
    #[error("radio frame guid mismatch: 0x{found:04x}")]
    GuidMismatch { found: u16 },
    #[error("radio frame crc mismatch: crc=0x{crc:04x} crc1=0x{crc1:04x}")]
    CrcMismatch { crc: u16, crc1: u16 },
    #[error("radio frame crc wrong: carried 0x{carried:04x}, computed 0x{computed:04x}")]
    CrcWrong { carried: u16, computed: u16 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEncodeError {
    #[error("radio payload of {len} bytes exceeds 56")]
    PayloadTooLarge { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioFrame {
    pub guid: u16,
    pub crc: u16,
    pub payload: [u8; RADIO_PAYLOAD_SIZE],
    pub crc1: u16,
    pub termination: [u8; 2],
}

impl RadioFrame {
    /// Build a frame around `payload`, zero-padding it to 56 bytes.
    pub fn encode(payload: &[u8]) -> Result<Self, RadioEncodeError> {
        if payload.len() > RADIO_PAYLOAD_SIZE {
            return Err(RadioEncodeError::PayloadTooLarge { len: payload.len() });
        }
        let mut padded = [0u8; RADIO_PAYLOAD_SIZE];
        padded[..payload.len()].copy_from_slice(payload);
        let crc = crc16(&padded);
        Ok(Self {
            guid: RADIO_GUID,
            crc,
            payload: padded,
            crc1: crc,
            termination: RADIO_TERMINATION,
        })
    }

    pub fn to_bytes(&self) -> [u8; RADIO_FRAME_SIZE] {
        let mut out = [0u8; RADIO_FRAME_SIZE];
        out[GUID_AT..CRC_AT].copy_from_slice(&self.guid.to_le_bytes());
        out[CRC_AT..PAYLOAD_AT].copy_from_slice(&self.crc.to_le_bytes());
        out[PAYLOAD_AT..CRC1_AT].copy_from_slice(&self.payload);
        out[CRC1_AT..TERM_AT].copy_from_slice(&self.crc1.to_le_bytes());
        out[TERM_AT..].copy_from_slice(&self.termination);
        out
    }

    /// Validate and parse the first 64 bytes of `bytes`.
    ///
    /// A bad termination sentinel does not fail the decode; check
    /// [`RadioFrame::termination_ok`] and warn.
    pub fn decode(bytes: &[u8]) -> Result<Self, RadioDecodeError> {
        if bytes.len() < RADIO_FRAME_SIZE {
            return Err(RadioDecodeError::Incomplete { got: bytes.len() });
        }

        let guid = u16::from_le_bytes([bytes[GUID_AT], bytes[GUID_AT + 1]]);
        if guid != RADIO_GUID {
            return Err(RadioDecodeError::GuidMismatch { found: guid });
        }

        let crc = u16::from_le_bytes([bytes[CRC_AT], bytes[CRC_AT + 1]]);
        let crc1 = u16::from_le_bytes([bytes[CRC1_AT], bytes[CRC1_AT + 1]]);
        if crc != crc1 {
            return Err(RadioDecodeError::CrcMismatch { crc, crc1 });
        }

        let mut payload = [0u8; RADIO_PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes[PAYLOAD_AT..CRC1_AT]);
        let computed = crc16(&payload);
        if computed != crc {
            return Err(RadioDecodeError::CrcWrong { carried: crc, computed });
        }

        Ok(Self {
            guid,
            crc,
            payload,
            crc1,
            termination: [bytes[TERM_AT], bytes[TERM_AT + 1]],
        })
    }

    pub fn termination_ok(&self) -> bool {
        self.termination == RADIO_TERMINATION
    }
}
