// state.rs: liveness flags shared by the three workers
//
// Each flag has one writer:
//   radio_ready        downlink (radio ingress) worker
//   connection_ready   ConnectionManager (driven by the watchdog and the network reader)
//   peer_status        network ingress worker
// Everyone else only reads.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use gs_protocol::{Participant, StatusByte};
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum RunFlag {
    Running = 1,
    RecoverableFault = 0,
    FatalFault = -1,
}

impl RunFlag {
    fn from_i8(v: i8) -> Self {
        match v {
            1 => Self::Running,
            0 => Self::RecoverableFault,
            _ => Self::FatalFault,
        }
    }

    /// Process exit status for a gateway that stopped in this state.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Running | Self::RecoverableFault => 0,
            Self::FatalFault => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ServerForced,
    TimedOut,
    BrokenPipe,
    SocketError,
    LocalClose,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerForced => "SERVER-FORCED",
            Self::TimedOut => "TIMED-OUT",
            Self::BrokenPipe => "BROKEN-PIPE",
            Self::SocketError => "SOCKET-ERROR",
            Self::LocalClose => "LOCAL-CLOSE",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct LinkState {
    radio_ready: AtomicBool,
    connection_ready: AtomicBool,
    run_flag: AtomicI8,
    peer_status: AtomicU8,
    disconnect_reason: Mutex<Option<DisconnectReason>>,
    // wakes wait_while_running() sleepers when the run flag changes
    stop_lock: Mutex<()>,
    stop_cv: Condvar,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    pub fn new() -> Self {
        Self {
            radio_ready: AtomicBool::new(false),
            connection_ready: AtomicBool::new(false),
            run_flag: AtomicI8::new(RunFlag::Running as i8),
            peer_status: AtomicU8::new(0),
            disconnect_reason: Mutex::new(None),
            stop_lock: Mutex::new(()),
            stop_cv: Condvar::new(),
        }
    }

    // ---- radio ----

    pub fn radio_ready(&self) -> bool {
        self.radio_ready.load(Ordering::Acquire)
    }

    pub fn set_radio_ready(&self, ready: bool) {
        self.radio_ready.store(ready, Ordering::Release);
    }

    // ---- connection ----

    pub fn connection_ready(&self) -> bool {
        self.connection_ready.load(Ordering::Acquire)
    }

    pub fn mark_connected(&self) {
        self.connection_ready.store(true, Ordering::Release);
    }

    /// Returns false if the connection was already marked down; the
    /// first reason recorded for a given outage wins.
    pub fn mark_disconnected(&self, reason: DisconnectReason) -> bool {
        let was_ready = self.connection_ready.swap(false, Ordering::AcqRel);
        if was_ready {
            *self.disconnect_reason.lock() = Some(reason);
        }
        was_ready
    }

    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.disconnect_reason.lock()
    }

    // ---- peer status ----

    pub fn peer_status(&self) -> StatusByte {
        StatusByte::from_raw(self.peer_status.load(Ordering::Acquire))
    }

    pub fn set_peer_status(&self, status: StatusByte) {
        self.peer_status.store(status.raw(), Ordering::Release);
    }

    /// What this gateway reports about itself in outgoing frames.
    pub fn own_status(&self) -> StatusByte {
        StatusByte::EMPTY.with(Participant::RoofUhf, self.radio_ready())
    }

    // ---- run flag ----

    pub fn run_flag(&self) -> RunFlag {
        RunFlag::from_i8(self.run_flag.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.run_flag() == RunFlag::Running
    }

    /// Leave `Running`. A recoverable stop never overwrites an earlier
    /// fault; a fatal stop always sticks. Returns the previous flag.
    pub fn stop(&self, to: RunFlag) -> RunFlag {
        let prev = match to {
            RunFlag::Running => return self.run_flag(),
            RunFlag::RecoverableFault => {
                match self.run_flag.compare_exchange(
                    RunFlag::Running as i8,
                    RunFlag::RecoverableFault as i8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(v) | Err(v) => v,
                }
            }
            RunFlag::FatalFault => self.run_flag.swap(RunFlag::FatalFault as i8, Ordering::AcqRel),
        };
        let _g = self.stop_lock.lock();
        self.stop_cv.notify_all();
        RunFlag::from_i8(prev)
    }

    /// Sleep for `dur`, returning early if the gateway is told to stop.
    /// Returns whether it is still running.
    pub fn wait_while_running(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut g = self.stop_lock.lock();
        while self.is_running() {
            if self.stop_cv.wait_until(&mut g, deadline).timed_out() {
                break;
            }
        }
        self.is_running()
    }
}
