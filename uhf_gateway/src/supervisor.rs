// supervisor.rs: start the three workers, stop them, and report how it ended
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};

use crate::commands::NetworkIngress;
use crate::config::Config;
use crate::downlink::RadioIngress;
use crate::errors::GatewayError;
use crate::health::Watchdog;
use crate::net::ConnectionManager;
use crate::radio::SharedRadio;
use crate::state::{LinkState, RunFlag};

/// A straggling reader may still hold the radio after the grace period.
const RADIO_SLEEP_WAIT: Duration = Duration::from_secs(1);

/// Reports a worker's exit on drop, so a panic is seen as well.
struct ExitGuard {
    name: &'static str,
    done: Sender<&'static str>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.done.send(self.name);
    }
}

pub struct Supervisor {
    state: Arc<LinkState>,
    conn: Arc<ConnectionManager>,
    radio: SharedRadio,
    workers: Vec<(&'static str, JoinHandle<()>)>,
    done_rx: Receiver<&'static str>,
    grace: Duration,
}

impl Supervisor {
    pub fn start(cfg: &Config, radio: SharedRadio) -> Result<Self, GatewayError> {
        let state = Arc::new(LinkState::new());
        let conn = Arc::new(ConnectionManager::new(cfg, state.clone()));
        let (done_tx, done_rx) = crossbeam_channel::unbounded();

        let mut sup = Self {
            state: state.clone(),
            conn: conn.clone(),
            radio: radio.clone(),
            workers: Vec::with_capacity(3),
            done_rx,
            grace: cfg.shutdown_grace,
        };

        let downlink = RadioIngress::new(cfg, state.clone(), conn.clone(), radio.clone());
        let uplink = NetworkIngress::new(cfg, state.clone(), conn.clone(), radio);
        let watchdog = Watchdog::new(cfg, state, conn);

        let jobs: [(&'static str, Box<dyn FnOnce() + Send>); 3] = [
            ("radio-ingress", Box::new(move || downlink.run())),
            ("network-ingress", Box::new(move || uplink.run())),
            ("watchdog", Box::new(move || watchdog.run())),
        ];
        for (name, job) in jobs {
            if let Err(e) = sup.spawn(name, &done_tx, job) {
                error!(error = %e, "gateway start failed");
                let _ = sup.shutdown_workers();
                return Err(e);
            }
        }

        info!(workers = sup.workers.len(), "gateway running");
        Ok(sup)
    }

    fn spawn(
        &mut self,
        name: &'static str,
        done: &Sender<&'static str>,
        work: impl FnOnce() + Send + 'static,
    ) -> Result<(), GatewayError> {
        let guard = ExitGuard {
            name,
            done: done.clone(),
        };
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let _guard = guard;
                work();
            })
            .map_err(|source| GatewayError::Spawn { name, source })?;
        self.workers.push((name, handle));
        Ok(())
    }

    pub fn state(&self) -> Arc<LinkState> {
        self.state.clone()
    }

    /// Stop everything and put the radio to sleep. Returns the final run
    /// flag; workers that outlive the grace period make the stop fatal.
    pub fn shutdown(mut self) -> Result<RunFlag, GatewayError> {
        let res = self.shutdown_workers();
        match self.radio.try_lock_for(RADIO_SLEEP_WAIT) {
            Some(mut r) => {
                if let Err(e) = r.sleep() {
                    warn!(error = %e, "radio sleep failed");
                }
            }
            None => warn!("radio still busy, not put to sleep"),
        }
        let flag = self.state.run_flag();
        info!(?flag, exit_code = flag.exit_code(), "gateway stopped");
        res.map(|_| flag)
    }

    fn shutdown_workers(&mut self) -> Result<(), GatewayError> {
        self.state.stop(RunFlag::RecoverableFault);
        // unblocks a reader parked in receive()
        self.conn.close();

        let deadline = Instant::now() + self.grace;
        let mut pending: Vec<&'static str> = self.workers.iter().map(|(n, _)| *n).collect();
        while !pending.is_empty() {
            match self.done_rx.recv_deadline(deadline) {
                Ok(name) => pending.retain(|n| *n != name),
                Err(_) => break,
            }
        }
        if !pending.is_empty() {
            error!(workers = ?pending, grace = ?self.grace, "workers did not stop in time");
            self.state.stop(RunFlag::FatalFault);
            // the stragglers are left detached
            self.workers.clear();
            return Err(GatewayError::ShutdownTimeout {
                names: pending,
                grace: self.grace,
            });
        }

        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                error!(worker = name, "worker panicked");
                self.state.stop(RunFlag::FatalFault);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    use crate::errors::RadioError;
    use crate::radio::{self, MockRadioLink, RadioIdentity};

    fn cfg() -> Config {
        // a port with nothing behind it
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        Config {
            server_port: port,
            poll_interval: Duration::from_millis(20),
            radio_retry: Duration::from_millis(1),
            radio_read_slice: Duration::from_millis(5),
            shutdown_grace: Duration::from_secs(5),
            ..Config::default()
        }
    }

    #[test]
    fn clean_stop_is_recoverable_and_sleeps_the_radio() {
        let mut radio = MockRadioLink::new();
        radio.expect_init().returning(|| Ok(()));
        radio
            .expect_identity()
            .returning(|| Ok(RadioIdentity { part: 0x4463, revision: 1 }));
        radio.expect_enable_streaming().returning(|| Ok(()));
        radio.expect_read().returning(|_, wait| {
            thread::sleep(wait);
            Ok(0)
        });
        radio.expect_sleep().times(1).returning(|| Ok(()));

        let sup = Supervisor::start(&cfg(), radio::shared(radio)).unwrap();
        let state = sup.state();
        thread::sleep(Duration::from_millis(50));
        assert!(state.radio_ready());
        assert!(state.is_running());

        let flag = sup.shutdown().unwrap();
        assert_eq!(flag, RunFlag::RecoverableFault);
        assert_eq!(flag.exit_code(), 0);
    }

    #[test]
    fn wrong_radio_ends_in_fatal_exit() {
        let mut radio = MockRadioLink::new();
        radio.expect_init().returning(|| Ok(()));
        radio
            .expect_identity()
            .returning(|| Ok(RadioIdentity { part: 0x1234, revision: 0 }));
        radio.expect_sleep().times(1).returning(|| Ok(()));

        let cfg = Config {
            radio_init_attempts: 2,
            ..cfg()
        };
        let sup = Supervisor::start(&cfg, radio::shared(radio)).unwrap();
        let state = sup.state();
        let deadline = Instant::now() + Duration::from_secs(5);
        while state.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let flag = sup.shutdown().unwrap();
        assert_eq!(flag, RunFlag::FatalFault);
        assert_eq!(flag.exit_code(), -1);
    }

    #[test]
    fn missing_radio_keeps_the_gateway_up() {
        let mut radio = MockRadioLink::new();
        radio
            .expect_init()
            .returning(|| Err(RadioError::Fault("no such device".into())));
        radio.expect_sleep().times(1).returning(|| Ok(()));

        let cfg = Config {
            radio_init_attempts: 2,
            ..cfg()
        };
        let sup = Supervisor::start(&cfg, radio::shared(radio)).unwrap();
        let state = sup.state();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(state.run_flag(), RunFlag::Running);
        assert!(!state.radio_ready());

        assert_eq!(sup.shutdown().unwrap().exit_code(), 0);
    }

    #[test]
    fn stuck_worker_turns_shutdown_fatal() {
        let mut radio = MockRadioLink::new();
        radio.expect_init().returning(|| Ok(()));
        radio
            .expect_identity()
            .returning(|| Ok(RadioIdentity { part: 0x4463, revision: 1 }));
        radio.expect_enable_streaming().returning(|| Ok(()));
        // a driver call that ignores its wait budget
        radio.expect_read().returning(|_, _| {
            thread::sleep(Duration::from_secs(3));
            Ok(0)
        });
        radio.expect_sleep().returning(|| Ok(()));

        let cfg = Config {
            shutdown_grace: Duration::from_millis(300),
            ..cfg()
        };
        let sup = Supervisor::start(&cfg, radio::shared(radio)).unwrap();
        let state = sup.state();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !state.radio_ready() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        let res = sup.shutdown();
        let timed_out = matches!(
            &res,
            Err(GatewayError::ShutdownTimeout { names, .. }) if names.contains(&"radio-ingress")
        );
        assert!(timed_out, "{res:?}");
        assert_eq!(state.run_flag(), RunFlag::FatalFault);
        assert_eq!(state.run_flag().exit_code(), -1);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
