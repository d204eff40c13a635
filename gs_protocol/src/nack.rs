// nack.rs: payload of locally generated NACK frames

/// Why the gateway could not forward a DATA frame to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NackCode {
    NoRadio = 1,
    RadioWriteFailed = 2,
    PayloadTooLarge = 3,
}

impl NackCode {
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::NoRadio),
            2 => Some(Self::RadioWriteFailed),
            3 => Some(Self::PayloadTooLarge),
            _ => None,
        }
    }
}

/// `| ack (1) | code (i32 LE) |`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackPayload {
    pub ack: bool,
    pub code: i32,
}

impl NackPayload {
    pub const SIZE: usize = 5;

    pub fn nack(code: NackCode) -> Self {
        Self {
            ack: false,
            code: code as i32,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0] = u8::from(self.ack);
        out[1..].copy_from_slice(&self.code.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            ack: bytes[0] != 0,
            code: i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        })
    }

    pub fn known_code(&self) -> Option<NackCode> {
        NackCode::from_i32(self.code)
    }
}
