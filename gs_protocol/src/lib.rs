// lib.rs: ground-station wire protocol (GST radio frames and server NetworkFrames)

use crc::{CRC_16_XMODEM, Crc};

pub mod nack;
pub mod network;
pub mod radio;
pub mod status;

pub use nack::{NackCode, NackPayload};
pub use network::{
    Destination, FrameType, MalformedKind, NETWORK_GUID, NETWORK_HEADER_SIZE, NETWORK_MAX_FRAME,
    NETWORK_MAX_PAYLOAD, NETWORK_TRAILER_SIZE, NetworkDecodeError, NetworkEncodeError, NetworkFrame,
    encode_frame,
};
pub use radio::{
    RADIO_FRAME_SIZE, RADIO_PAYLOAD_SIZE, RadioDecodeError, RadioEncodeError, RadioFrame,
};
pub use status::{Participant, StatusByte};

// =============================== Common =====================================

/// Version byte carried by every NetworkFrame.
pub const PROTOCOL_VERSION: u8 = 1;
pub const DEFAULT_SERVER_PORT: u16 = 54210;

// ================================ CRC-16 ====================================

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC-16/XMODEM: poly 0x1021, init 0x0000, no reflection, no final xor.
///
/// Both frame formats use this checksum. The check value over
/// `b"123456789"` is `0x31C3`.
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

// ================================ Tests =====================================
