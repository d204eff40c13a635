// downlink/mod.rs: radio ingress, GST frames off the air become DATA frames for the client
use std::sync::Arc;
use std::time::Duration;

use gs_protocol::{Destination, FrameType, RADIO_FRAME_SIZE, RadioFrame};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::errors::RadioError;
use crate::logging::frames::{self, Direction};
use crate::net::ConnectionManager;
use crate::radio::{self, RadioIdentity, RadioLink, SharedRadio};
use crate::state::{LinkState, RunFlag};

/// Pause after a transient radio error so a wedged driver is not spun on.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct RadioIngress {
    state: Arc<LinkState>,
    conn: Arc<ConnectionManager>,
    radio: SharedRadio,
    expected_part: u16,
    read_slice: Duration,
    retry: Duration,
    init_attempts: u32,
    mismatches: u32,
}

impl RadioIngress {
    pub fn new(cfg: &Config, state: Arc<LinkState>, conn: Arc<ConnectionManager>, radio: SharedRadio) -> Self {
        Self {
            state,
            conn,
            radio,
            expected_part: cfg.radio_part,
            read_slice: cfg.radio_read_slice,
            retry: cfg.radio_retry,
            init_attempts: cfg.radio_init_attempts,
            mismatches: 0,
        }
    }

    pub fn run(mut self) {
        info!("radio ingress started");
        while self.state.is_running() {
            if !self.state.radio_ready() {
                self.bring_up();
                continue;
            }
            match self.read_frame() {
                Ok(Some(bytes)) => self.forward(&bytes),
                Ok(None) => {}
                Err(e) if e.is_fault() => {
                    error!(error = %e, "radio fault, re-initialising");
                    self.state.set_radio_ready(false);
                }
                Err(e) => {
                    warn!(error = %e, "radio read failed");
                    self.state.wait_while_running(ERROR_BACKOFF);
                }
            }
        }
        self.state.stop(RunFlag::RecoverableFault);
        info!("radio ingress stopped");
    }

    /// init, identity check, then pipe mode. A missing or failing radio is
    /// retried forever; only a radio that keeps reporting the wrong part
    /// exhausts the attempt budget and stops the gateway.
    fn bring_up(&mut self) {
        let res = power_on(&mut *self.radio.lock(), self.expected_part);

        match res {
            Ok(id) => {
                self.mismatches = 0;
                self.state.set_radio_ready(true);
                info!(part = %format!("0x{:04x}", id.part), revision = id.revision, "radio ready");
            }
            Err(e @ RadioError::IdentityMismatch { .. }) => {
                self.mismatches += 1;
                if self.init_attempts != 0 && self.mismatches >= self.init_attempts {
                    error!(error = %e, attempts = self.mismatches, "wrong radio attached, giving up");
                    self.state.stop(RunFlag::FatalFault);
                    return;
                }
                warn!(error = %e, attempt = self.mismatches, retry_in = ?self.retry, "radio identity check failed");
                self.state.wait_while_running(self.retry);
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?self.retry, "radio init failed");
                self.state.wait_while_running(self.retry);
            }
        }
    }

    /// Collect one 64-byte frame. The radio lock is taken per read slice
    /// so uplink writes can get in between. `Ok(None)` when the air was
    /// quiet for a slice; a partial frame followed by silence is dropped.
    fn read_frame(&mut self) -> Result<Option<[u8; RADIO_FRAME_SIZE]>, RadioError> {
        let mut buf = [0u8; RADIO_FRAME_SIZE];
        let mut filled = 0;
        while filled < RADIO_FRAME_SIZE {
            let n = self.radio.lock().read(&mut buf[filled..], self.read_slice)?;
            if n == 0 {
                if filled > 0 {
                    debug!(got = filled, "partial radio frame timed out");
                }
                return Ok(None);
            }
            filled += n;
            if !self.state.is_running() {
                return Ok(None);
            }
        }
        Ok(Some(buf))
    }

    fn forward(&self, bytes: &[u8]) {
        let frame = match RadioFrame::decode(bytes) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "dropping radio frame");
                return;
            }
        };
        if !frame.termination_ok() {
            warn!(termination = %hex::encode(frame.termination), "radio frame has bad termination");
        }
        frames::record(Direction::RadioRx, "GST", bytes.len());

        if !self.state.connection_ready() {
            debug!("no server connection, radio frame dropped");
            return;
        }
        if let Err(e) = self.conn.transmit(FrameType::Data, Destination::Client, &frame.payload) {
            warn!(error = %e, "forwarding radio frame failed");
        }
    }
}

fn power_on(r: &mut dyn RadioLink, expected_part: u16) -> Result<RadioIdentity, RadioError> {
    r.init()?;
    let id = radio::check_identity(r, expected_part)?;
    r.enable_streaming()?;
    Ok(id)
}
