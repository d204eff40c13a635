use std::sync::Arc;
use std::time::Duration;

use gs_protocol::{
    Destination, FrameType, NETWORK_HEADER_SIZE, NETWORK_MAX_FRAME, NETWORK_TRAILER_SIZE, NackCode,
    NackPayload, NetworkFrame, RadioFrame,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::ConnectionError;
use crate::logging::frames::{self, Direction};
use crate::net::{ConnectionManager, FrameAssembler};
use crate::radio::{self, SharedRadio};
use crate::state::{LinkState, RunFlag};

/// How often a disconnected worker looks at `connection_ready` again.
const IDLE_POLL: Duration = Duration::from_millis(200);

/// What became of one frame from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Transmitted,
    Nacked(NackCode),
    StatusUpdated,
    Ignored,
}

pub struct NetworkIngress {
    state: Arc<LinkState>,
    conn: Arc<ConnectionManager>,
    radio: SharedRadio,
    expected_part: u16,
    assembler: FrameAssembler,
}

impl NetworkIngress {
    pub fn new(cfg: &Config, state: Arc<LinkState>, conn: Arc<ConnectionManager>, radio: SharedRadio) -> Self {
        Self {
            state,
            conn,
            radio,
            expected_part: cfg.radio_part,
            assembler: FrameAssembler::default(),
        }
    }

    pub fn run(mut self) {
        info!("network ingress started");
        while self.state.is_running() {
            if !self.state.connection_ready() {
                // the watchdog owns reconnection
                self.state.wait_while_running(IDLE_POLL);
                continue;
            }
            if self.assembler.buffered() > 0 {
                debug!(bytes = self.assembler.buffered(), "dropping partial frame from previous connection");
                self.assembler.clear();
            }
            self.read_connection();
        }
        self.state.stop(RunFlag::RecoverableFault);
        info!("network ingress stopped");
    }

    /// Read frames until the connection drops or the gateway stops.
    fn read_connection(&mut self) {
        let mut buf = [0u8; NETWORK_MAX_FRAME];
        while self.state.is_running() && self.state.connection_ready() {
            let n = match self.conn.receive(&mut buf) {
                Ok(n) => n,
                Err(ConnectionError::Closed | ConnectionError::TimedOut) => {
                    info!(reason = ?self.state.disconnect_reason(), "server link down, waiting for reconnect");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "server receive failed");
                    return;
                }
            };
            debug!(bytes = n, dump = %hex::encode(&buf[..n]), "received from server");

            self.assembler.push(&buf[..n]);
            while let Some(res) = self.assembler.next_frame() {
                match res {
                    Ok(frame) => {
                        let len = NETWORK_HEADER_SIZE + frame.payload.len() + NETWORK_TRAILER_SIZE;
                        frames::record(Direction::NetRx, frame.frame_type, len);
                        self.dispatch(&frame);
                    }
                    Err(e) => warn!(error = %e, "discarding network frame"),
                }
            }
        }
    }

    pub fn dispatch(&self, frame: &NetworkFrame) -> Dispatched {
        match frame.frame_type {
            FrameType::Data => self.uplink(&frame.payload),
            FrameType::Poll => {
                self.state.set_peer_status(frame.status);
                info!(peer = %frame.status, "server poll");
                Dispatched::StatusUpdated
            }
            FrameType::UhfConfig => {
                info!(bytes = frame.payload.len(), "UHF config received, not applied");
                Dispatched::Ignored
            }
            other => {
                debug!(frame_type = %other, destination = ?frame.destination, "frame ignored");
                Dispatched::Ignored
            }
        }
    }

    /// Put a DATA payload on the air, or tell the client why not.
    fn uplink(&self, payload: &[u8]) -> Dispatched {
        if !self.state.radio_ready() {
            return self.nack(NackCode::NoRadio);
        }
        let bytes = match RadioFrame::encode(payload) {
            Ok(f) => f.to_bytes(),
            Err(e) => {
                warn!(error = %e, "uplink payload does not fit a radio frame");
                return self.nack(NackCode::PayloadTooLarge);
            }
        };

        let res = {
            let mut r = self.radio.lock();
            match radio::check_identity(&mut *r, self.expected_part) {
                Ok(_) => r.write(&bytes).map_err(|e| (NackCode::RadioWriteFailed, e)),
                Err(e) => Err((NackCode::NoRadio, e)),
            }
        };
        match res {
            Ok(()) => {
                frames::record(Direction::RadioTx, "GST", bytes.len());
                debug!(bytes = payload.len(), "uplinked to radio");
                Dispatched::Transmitted
            }
            Err((code, e)) => {
                warn!(error = %e, ?code, "uplink to radio failed");
                self.nack(code)
            }
        }
    }

    fn nack(&self, code: NackCode) -> Dispatched {
        let payload = NackPayload::nack(code).to_bytes();
        if let Err(e) = self.conn.transmit(FrameType::Nack, Destination::Client, &payload) {
            warn!(error = %e, ?code, "could not send NACK");
        }
        Dispatched::Nacked(code)
    }
}
