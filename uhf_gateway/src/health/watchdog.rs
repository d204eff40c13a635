// health/watchdog.rs: NULL heartbeat while connected, reconnect while not
use std::sync::Arc;
use std::time::Duration;

use gs_protocol::{Destination, FrameType};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::net::ConnectionManager;
use crate::state::LinkState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Heartbeat,
    HeartbeatFailed,
    Reconnected,
    ReconnectFailed,
}

/// The only worker that calls `connect`.
pub struct Watchdog {
    state: Arc<LinkState>,
    conn: Arc<ConnectionManager>,
    interval: Duration,
}

impl Watchdog {
    pub fn new(cfg: &Config, state: Arc<LinkState>, conn: Arc<ConnectionManager>) -> Self {
        Self {
            state,
            conn,
            interval: cfg.poll_interval,
        }
    }

    pub fn run(self) {
        info!(interval = ?self.interval, "watchdog started");
        while self.state.is_running() {
            self.tick();
            self.state.wait_while_running(self.interval);
        }
        info!("watchdog stopped");
    }

    pub fn tick(&self) -> Tick {
        if self.state.connection_ready() {
            return match self.conn.transmit(FrameType::Null, Destination::Server, &[]) {
                Ok(_) => {
                    debug!(own = %self.state.own_status(), peer = %self.state.peer_status(), "heartbeat");
                    Tick::Heartbeat
                }
                Err(e) => {
                    warn!(error = %e, "heartbeat send failed");
                    Tick::HeartbeatFailed
                }
            };
        }

        match self.conn.connect() {
            Ok(()) => Tick::Reconnected,
            Err(e) => {
                warn!(error = %e, last_reason = ?self.state.disconnect_reason(), "server unreachable");
                Tick::ReconnectFailed
            }
        }
    }
}
