// radio/mod.rs: the UHF transceiver as the workers see it
pub mod udp;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::RadioError;

pub use udp::UdpRadio;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioIdentity {
    pub part: u16,
    pub revision: u8,
}

/// Driver boundary for the half-duplex radio.
///
/// `read` returns `Ok(0)` when nothing arrived within `max_wait`.
/// `write` succeeds only if the whole frame was taken by the radio.
#[cfg_attr(test, mockall::automock)]
pub trait RadioLink: Send {
    fn init(&mut self) -> Result<(), RadioError>;
    fn identity(&mut self) -> Result<RadioIdentity, RadioError>;
    fn enable_streaming(&mut self) -> Result<(), RadioError>;
    fn read(&mut self, buf: &mut [u8], max_wait: Duration) -> Result<usize, RadioError>;
    fn write(&mut self, frame: &[u8]) -> Result<(), RadioError>;
    fn sleep(&mut self) -> Result<(), RadioError>;
}

/// One radio, read by the downlink worker and written by the command
/// worker. Hold the lock for a single call, never across a loop.
pub type SharedRadio = Arc<Mutex<dyn RadioLink>>;

pub fn shared(radio: impl RadioLink + 'static) -> SharedRadio {
    Arc::new(Mutex::new(radio))
}

/// Ask the radio who it is and compare against the expected part number.
pub fn check_identity(radio: &mut dyn RadioLink, expected_part: u16) -> Result<RadioIdentity, RadioError> {
    let id = radio.identity()?;
    if id.part != expected_part {
        return Err(RadioError::IdentityMismatch {
            expected: expected_part,
            found: id.part,
        });
    }
    Ok(id)
}
