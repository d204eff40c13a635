// net/framing.rs: cut the TCP byte stream back into NetworkFrames
use gs_protocol::{
    MalformedKind, NETWORK_GUID, NetworkDecodeError, NetworkFrame,
};

const GUID_LE: [u8; 2] = NETWORK_GUID.to_le_bytes();

/// Accumulates received bytes and yields whole frames.
///
/// Garbage in front of a frame is skipped up to the next guid; a frame
/// that fails validation is dropped and reported, and scanning resumes.
#[derive(Default, Debug)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Forget any partial frame, e.g. after the connection is replaced.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// `None` means more bytes are needed.
    pub fn next_frame(&mut self) -> Option<Result<NetworkFrame, NetworkDecodeError>> {
        if self.buf.len() < GUID_LE.len() {
            return None;
        }

        if self.buf[..2] != GUID_LE {
            let found = u16::from_le_bytes([self.buf[0], self.buf[1]]);
            let skip = self.resync_point();
            self.buf.drain(..skip);
            return Some(Err(NetworkDecodeError::Malformed(MalformedKind::Guid(found))));
        }

        let len = match NetworkFrame::frame_len(&self.buf) {
            Ok(None) => return None,
            Ok(Some(len)) => len,
            Err(e) => {
                self.buf.drain(..GUID_LE.len());
                return Some(Err(e));
            }
        };
        if self.buf.len() < len {
            return None;
        }

        let res = NetworkFrame::decode(&self.buf[..len]);
        match res {
            // the length field is suspect; only step past the guid
            Err(NetworkDecodeError::Malformed(_)) => {
                self.buf.drain(..GUID_LE.len());
            }
            _ => {
                self.buf.drain(..len);
            }
        }
        Some(res)
    }

    /// Offset of the next guid candidate after position 0. A trailing
    /// lone guid byte is kept since its partner may still be in flight.
    fn resync_point(&self) -> usize {
        match self.buf[1..].windows(2).position(|w| w == GUID_LE) {
            Some(i) => i + 1,
            None if self.buf.last() == Some(&GUID_LE[0]) => self.buf.len() - 1,
            None => self.buf.len(),
        }
    }
}
