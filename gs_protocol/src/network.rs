//! NetworkFrame: the variable-length frame exchanged with the ground-station server.
//!
//! Wire format, version 1 (little-endian):
//! ```text
//! | guid (2) | version (1) | type (1) | destination (1) | status (1) | len (2) |
//! | payload (len, <= 256) | crc (2) | termination 0xAAAA (2) |
//! ```
//! `crc` is CRC-16/XMODEM over everything before it.

use std::fmt;

use thiserror::Error;

use crate::{PROTOCOL_VERSION, StatusByte, crc16};

pub const NETWORK_GUID: u16 = 0x1A1C;
pub const NETWORK_HEADER_SIZE: usize = 8;
pub const NETWORK_TRAILER_SIZE: usize = 4;
pub const NETWORK_MAX_PAYLOAD: usize = 256;
pub const NETWORK_MAX_FRAME: usize = NETWORK_HEADER_SIZE + NETWORK_MAX_PAYLOAD + NETWORK_TRAILER_SIZE;
pub const NETWORK_TERMINATION: [u8; 2] = [0xAA, 0xAA];

// =============================== Enums ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Keep-alive.
    Null,
    Ack,
    Nack,
    UhfConfig,
    XbandConfig,
    Data,
    PollXbandConfig,
    XbandCommand,
    /// Server status broadcast.
    Poll,
    Error,
    /// A type byte this build does not know. Kept so newer servers can
    /// talk to older gateways.
    Unknown(u8),
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Null,
            0x01 => Self::Ack,
            0x02 => Self::Nack,
            0x03 => Self::UhfConfig,
            0x04 => Self::XbandConfig,
            0x05 => Self::Data,
            0x06 => Self::PollXbandConfig,
            0x07 => Self::XbandCommand,
            0x08 => Self::Poll,
            0xFF => Self::Error,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Null => 0x00,
            Self::Ack => 0x01,
            Self::Nack => 0x02,
            Self::UhfConfig => 0x03,
            Self::XbandConfig => 0x04,
            Self::Data => 0x05,
            Self::PollXbandConfig => 0x06,
            Self::XbandCommand => 0x07,
            Self::Poll => 0x08,
            Self::Error => 0xFF,
            Self::Unknown(b) => b,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Ack => f.write_str("ACK"),
            Self::Nack => f.write_str("NACK"),
            Self::UhfConfig => f.write_str("UHF_CONFIG"),
            Self::XbandConfig => f.write_str("XBAND_CONFIG"),
            Self::Data => f.write_str("DATA"),
            Self::PollXbandConfig => f.write_str("POLL_XBAND_CONFIG"),
            Self::XbandCommand => f.write_str("XBAND_COMMAND"),
            Self::Poll => f.write_str("POLL"),
            Self::Error => f.write_str("ERROR"),
            Self::Unknown(b) => write!(f, "UNKNOWN(0x{b:02x})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Destination {
    Client = 1,
    RoofUhf = 2,
    RoofXband = 3,
    Haystack = 4,
    Server = 5,
    Track = 6,
}

impl Destination {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Client),
            2 => Some(Self::RoofUhf),
            3 => Some(Self::RoofXband),
            4 => Some(Self::Haystack),
            5 => Some(Self::Server),
            6 => Some(Self::Track),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

// =============================== Errors =====================================

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    #[error("truncated at {0} bytes")]
    Truncated(usize),
    #[error("bad guid 0x{0:04x}")]
    Guid(u16),
    #[error("unsupported version {0}")]
    Version(u8),
    #[error("unknown destination {0}")]
    Destination(u8),
    #[error("payload length {0} exceeds 256")]
    PayloadLength(usize),
    #[error("frame length {got}, header implies {expected}")]
    Length { expected: usize, got: usize },
    #[error("bad termination")]
    Termination,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkDecodeError {
    #[error("malformed network frame: {0}")]
    Malformed(MalformedKind),
    #[error("integrity check failed: carried 0x{carried:04x}, computed 0x{computed:04x}")]
    IntegrityFailed { carried: u16, computed: u16 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEncodeError {
    #[error("network payload of {len} bytes exceeds 256")]
    PayloadTooLarge { len: usize },
}

// =============================== Frame ======================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkFrame {
    pub frame_type: FrameType,
    pub destination: Destination,
    pub status: StatusByte,
    pub payload: Vec<u8>,
}

/// Serialize one frame. Fails only when the payload does not fit.
pub fn encode_frame(
    frame_type: FrameType,
    destination: Destination,
    status: StatusByte,
    payload: &[u8],
) -> Result<Vec<u8>, NetworkEncodeError> {
    if payload.len() > NETWORK_MAX_PAYLOAD {
        return Err(NetworkEncodeError::PayloadTooLarge { len: payload.len() });
    }

    let mut out = Vec::with_capacity(NETWORK_HEADER_SIZE + payload.len() + NETWORK_TRAILER_SIZE);
    out.extend_from_slice(&NETWORK_GUID.to_le_bytes());
    out.push(PROTOCOL_VERSION);
    out.push(frame_type.as_byte());
    out.push(destination.as_byte());
    out.push(status.raw());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    let crc = crc16(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&NETWORK_TERMINATION);
    Ok(out)
}

impl NetworkFrame {
    pub fn new(
        frame_type: FrameType,
        destination: Destination,
        status: StatusByte,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self, NetworkEncodeError> {
        let payload = payload.into();
        if payload.len() > NETWORK_MAX_PAYLOAD {
            return Err(NetworkEncodeError::PayloadTooLarge { len: payload.len() });
        }
        Ok(Self {
            frame_type,
            destination,
            status,
            payload,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, NetworkEncodeError> {
        encode_frame(self.frame_type, self.destination, self.status, &self.payload)
    }

    /// Total on-wire length of the frame whose header starts `prefix`.
    ///
    /// `Ok(None)` means the header itself is not complete yet. Header
    /// fields are validated so a stream reader can resynchronise on
    /// garbage without waiting for a bogus length to fill up.
    pub fn frame_len(prefix: &[u8]) -> Result<Option<usize>, NetworkDecodeError> {
        if prefix.len() < NETWORK_HEADER_SIZE {
            return Ok(None);
        }
        let guid = u16::from_le_bytes([prefix[0], prefix[1]]);
        if guid != NETWORK_GUID {
            return Err(NetworkDecodeError::Malformed(MalformedKind::Guid(guid)));
        }
        if prefix[2] != PROTOCOL_VERSION {
            return Err(NetworkDecodeError::Malformed(MalformedKind::Version(prefix[2])));
        }
        if Destination::from_byte(prefix[4]).is_none() {
            return Err(NetworkDecodeError::Malformed(MalformedKind::Destination(prefix[4])));
        }
        let len = u16::from_le_bytes([prefix[6], prefix[7]]) as usize;
        if len > NETWORK_MAX_PAYLOAD {
            return Err(NetworkDecodeError::Malformed(MalformedKind::PayloadLength(len)));
        }
        Ok(Some(NETWORK_HEADER_SIZE + len + NETWORK_TRAILER_SIZE))
    }

    /// Parse exactly one frame. `bytes` must hold the whole frame and
    /// nothing else.
    pub fn decode(bytes: &[u8]) -> Result<Self, NetworkDecodeError> {
        let expected = match Self::frame_len(bytes)? {
            Some(n) => n,
            None => {
                return Err(NetworkDecodeError::Malformed(MalformedKind::Truncated(bytes.len())));
            }
        };
        if bytes.len() != expected {
            return Err(NetworkDecodeError::Malformed(MalformedKind::Length {
                expected,
                got: bytes.len(),
            }));
        }

        let crc_at = expected - NETWORK_TRAILER_SIZE;
        if bytes[crc_at + 2..] != NETWORK_TERMINATION {
            return Err(NetworkDecodeError::Malformed(MalformedKind::Termination));
        }

        let carried = u16::from_le_bytes([bytes[crc_at], bytes[crc_at + 1]]);
        let computed = crc16(&bytes[..crc_at]);
        if carried != computed {
            return Err(NetworkDecodeError::IntegrityFailed { carried, computed });
        }

        // frame_len() already vetted the destination byte
        let destination = Destination::from_byte(bytes[4])
            .ok_or(NetworkDecodeError::Malformed(MalformedKind::Destination(bytes[4])))?;

        Ok(Self {
            frame_type: FrameType::from_byte(bytes[3]),
            destination,
            status: StatusByte::from_raw(bytes[5]),
            payload: bytes[NETWORK_HEADER_SIZE..crc_at].to_vec(),
        })
    }
}

// ================================ Tests =====================================
