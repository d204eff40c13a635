// net/connection.rs: the single TCP connection to the ground-station server
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gs_protocol::{Destination, FrameType, encode_frame};
use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::{ConnectError, ConnectionError};
use crate::logging::frames::{self, Direction};
use crate::state::{DisconnectReason, LinkState};

pub struct ConnectionManager {
    host: String,
    port: u16,
    connect_timeout_secs: i64,
    recv_timeout: Duration,
    state: Arc<LinkState>,
    stream: RwLock<Option<Arc<TcpStream>>>,
    // one writer on the wire at a time
    send_lock: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(cfg: &Config, state: Arc<LinkState>) -> Self {
        Self {
            host: cfg.server_host.clone(),
            port: cfg.server_port,
            connect_timeout_secs: cfg.connect_timeout_secs,
            recv_timeout: cfg.recv_timeout,
            state,
            stream: RwLock::new(None),
            send_lock: Mutex::new(()),
        }
    }

    /// Upper bound on one connect attempt. Zero or negative settings
    /// still wait one second.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(if self.connect_timeout_secs > 0 {
            self.connect_timeout_secs as u64
        } else {
            1
        })
    }

    /// Name lookup goes through the system resolver, which blocks and is
    /// not covered by the connect timeout.
    fn resolve(&self) -> Result<Vec<SocketAddr>, ConnectError> {
        let target = format!("{}:{}", self.host, self.port);
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConnectError::AddressInvalid {
                addr: target.clone(),
                reason: e.to_string(),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectError::AddressInvalid {
                addr: target,
                reason: "no addresses".into(),
            });
        }
        Ok(addrs)
    }

    /// Open a fresh connection, replacing any previous one.
    ///
    /// Every resolved address is tried in turn until one answers, all
    /// within a single connect timeout. socket2 issues a non-blocking
    /// connect, polls for writability, checks SO_ERROR and restores
    /// blocking mode.
    pub fn connect(&self) -> Result<(), ConnectError> {
        let addrs = self.resolve()?;
        let deadline = Instant::now() + self.connect_timeout();

        let mut last = None;
        for addr in addrs {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.open(addr, left) {
                Ok(stream) => {
                    {
                        let mut cur = self.stream.write();
                        if let Some(old) = cur.replace(Arc::new(stream)) {
                            let _ = old.shutdown(Shutdown::Both);
                        }
                        self.state.mark_connected();
                    }
                    info!(%addr, "connected to server");
                    return Ok(());
                }
                Err(e @ ConnectError::SocketCreateFailed(_)) => return Err(e),
                Err(e) => {
                    debug!(%addr, error = %e, "address did not answer");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| ConnectError::AddressInvalid {
            addr: format!("{}:{}", self.host, self.port),
            reason: "connect timeout spent before any attempt".into(),
        }))
    }

    fn open(&self, addr: SocketAddr, timeout: Duration) -> Result<TcpStream, ConnectError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(ConnectError::SocketCreateFailed)?;
        socket
            .connect_timeout(&addr.into(), timeout)
            .map_err(|source| ConnectError::ConnectFailed { addr, source })?;

        let stream: TcpStream = socket.into();
        // a stalled server must not pin the reader or a sender forever
        stream
            .set_read_timeout(Some(self.recv_timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.recv_timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|source| ConnectError::ConnectFailed { addr, source })?;
        Ok(stream)
    }

    fn current(&self) -> Option<Arc<TcpStream>> {
        self.stream.read().clone()
    }

    fn drop_connection(&self, s: &Arc<TcpStream>, reason: DisconnectReason) {
        // a reader still holding a replaced stream must not clobber the new
        // one; the read guard keeps connect() from swapping in between
        let cur = self.stream.read();
        if cur.as_ref().is_some_and(|c| Arc::ptr_eq(c, s)) && self.state.mark_disconnected(reason) {
            warn!(%reason, "server connection lost");
        }
    }

    /// Write `bytes` in full. Peer resets surface as errors and mark the
    /// connection down; they never raise SIGPIPE.
    pub fn send(&self, bytes: &[u8]) -> Result<usize, ConnectionError> {
        if !self.state.connection_ready() {
            return Err(ConnectionError::NotConnected);
        }
        let stream = self.current().ok_or(ConnectionError::NotConnected)?;

        let _g = self.send_lock.lock();
        match (&*stream).write_all(bytes) {
            Ok(()) => Ok(bytes.len()),
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => DisconnectReason::BrokenPipe,
                    ErrorKind::WouldBlock | ErrorKind::TimedOut => DisconnectReason::TimedOut,
                    _ => DisconnectReason::SocketError,
                };
                self.drop_connection(&stream, reason);
                Err(e.into())
            }
        }
    }

    /// Frame `payload` and send it, stamped with this gateway's status.
    pub fn transmit(
        &self,
        frame_type: FrameType,
        destination: Destination,
        payload: &[u8],
    ) -> Result<usize, ConnectionError> {
        let bytes = encode_frame(frame_type, destination, self.state.own_status(), payload)?;
        let n = self.send(&bytes)?;
        frames::record(Direction::NetTx, frame_type, n);
        debug!(%frame_type, ?destination, bytes = n, "sent frame");
        Ok(n)
    }

    /// Blocking read bounded by the receive timeout. Zero bytes (peer
    /// closed) and timeouts come back as errors and mark the connection
    /// down with the matching reason.
    pub fn receive(&self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let stream = self.current().ok_or(ConnectionError::NotConnected)?;
        loop {
            match (&*stream).read(buf) {
                Ok(0) => {
                    self.drop_connection(&stream, DisconnectReason::ServerForced);
                    return Err(ConnectionError::Closed);
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    self.drop_connection(&stream, DisconnectReason::TimedOut);
                    return Err(ConnectionError::TimedOut);
                }
                Err(e) => {
                    self.drop_connection(&stream, DisconnectReason::SocketError);
                    return Err(e.into());
                }
            }
        }
    }

    /// Release the socket. Safe to call any number of times.
    pub fn close(&self) {
        if let Some(s) = self.stream.write().take() {
            let _ = s.shutdown(Shutdown::Both);
            self.state.mark_disconnected(DisconnectReason::LocalClose);
            info!("server connection closed");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    use gs_protocol::NetworkFrame;

    fn manager_for(listener: &TcpListener, state: Arc<LinkState>) -> ConnectionManager {
        let cfg = Config {
            server_port: listener.local_addr().unwrap().port(),
            recv_timeout: Duration::from_secs(1),
            ..Config::default()
        };
        ConnectionManager::new(&cfg, state)
    }

    #[test]
    fn connect_marks_ready_and_frames_arrive() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let conn = manager_for(&listener, state.clone());

        conn.connect().unwrap();
        assert!(state.connection_ready());
        let (mut server, _) = listener.accept().unwrap();

        let n = conn.transmit(FrameType::Null, Destination::Server, &[]).unwrap();
        let mut buf = vec![0u8; n];
        server.read_exact(&mut buf).unwrap();
        let frame = NetworkFrame::decode(&buf).unwrap();
        assert_eq!(frame.frame_type, FrameType::Null);
        assert_eq!(frame.destination, Destination::Server);
    }

    #[test]
    fn peer_close_is_server_forced() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let conn = manager_for(&listener, state.clone());
        conn.connect().unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(server);

        let mut buf = [0u8; 64];
        assert!(matches!(conn.receive(&mut buf), Err(ConnectionError::Closed)));
        assert!(!state.connection_ready());
        assert_eq!(state.disconnect_reason().map(|r| r.as_str()), Some("SERVER-FORCED"));
    }

    #[test]
    fn silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let conn = manager_for(&listener, state.clone());
        conn.connect().unwrap();
        let (_server, _) = listener.accept().unwrap();

        let started = Instant::now();
        let mut buf = [0u8; 64];
        assert!(matches!(conn.receive(&mut buf), Err(ConnectionError::TimedOut)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(state.disconnect_reason().map(|r| r.as_str()), Some("TIMED-OUT"));
    }

    #[test]
    fn send_without_connection_is_refused() {
        let state = Arc::new(LinkState::new());
        let conn = ConnectionManager::new(&Config::default(), state);
        assert!(matches!(conn.send(b"x"), Err(ConnectionError::NotConnected)));
        let mut buf = [0u8; 4];
        assert!(matches!(conn.receive(&mut buf), Err(ConnectionError::NotConnected)));
    }

    #[test]
    fn refused_connect_fails_fast() {
        // grab a free port, then free it so nothing is listening
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let cfg = Config {
            server_port: port,
            ..Config::default()
        };
        let state = Arc::new(LinkState::new());
        let conn = ConnectionManager::new(&cfg, state.clone());
        assert!(matches!(conn.connect(), Err(ConnectError::ConnectFailed { .. })));
        assert!(!state.connection_ready());
    }

    #[test]
    fn unreachable_connect_is_bounded_by_timeout() {
        let cfg = Config {
            // TEST-NET-1 is never routed
            server_host: "192.0.2.1".into(),
            connect_timeout_secs: 1,
            ..Config::default()
        };
        let conn = ConnectionManager::new(&cfg, Arc::new(LinkState::new()));
        let started = Instant::now();
        assert!(matches!(conn.connect(), Err(ConnectError::ConnectFailed { .. })));
        assert!(started.elapsed() < Duration::from_millis(2500));
    }

    #[test]
    fn bad_host_is_address_invalid() {
        let cfg = Config {
            server_host: "not a host name".into(),
            ..Config::default()
        };
        let conn = ConnectionManager::new(&cfg, Arc::new(LinkState::new()));
        assert!(matches!(conn.connect(), Err(ConnectError::AddressInvalid { .. })));
    }

    #[test]
    fn non_positive_timeout_waits_one_second() {
        for secs in [0, -5] {
            let cfg = Config {
                connect_timeout_secs: secs,
                ..Config::default()
            };
            let conn = ConnectionManager::new(&cfg, Arc::new(LinkState::new()));
            assert_eq!(conn.connect_timeout(), Duration::from_secs(1));
        }
    }

    #[test]
    fn close_twice_is_harmless() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let conn = manager_for(&listener, state.clone());
        conn.connect().unwrap();
        conn.close();
        conn.close();
        assert!(!state.connection_ready());
        assert_eq!(state.disconnect_reason().map(|r| r.as_str()), Some("LOCAL-CLOSE"));
    }

    #[test]
    fn close_wakes_a_blocked_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let conn = Arc::new(ConnectionManager::new(
            &Config {
                server_port: listener.local_addr().unwrap().port(),
                recv_timeout: Duration::from_secs(10),
                ..Config::default()
            },
            state,
        ));
        conn.connect().unwrap();
        let (_server, _) = listener.accept().unwrap();

        let reader = {
            let conn = conn.clone();
            std::thread::spawn(move || {
                let mut buf = [0u8; 16];
                let started = Instant::now();
                let _ = conn.receive(&mut buf);
                started.elapsed()
            })
        };
        std::thread::sleep(Duration::from_millis(100));
        conn.close();
        assert!(reader.join().unwrap() < Duration::from_secs(5));
    }

    #[test]
    fn reconnect_replaces_the_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let conn = manager_for(&listener, state.clone());
        conn.connect().unwrap();
        let (first, _) = listener.accept().unwrap();
        drop(first);
        let mut buf = [0u8; 8];
        let _ = conn.receive(&mut buf);
        assert!(!state.connection_ready());

        conn.connect().unwrap();
        let (_second, _) = listener.accept().unwrap();
        assert!(state.connection_ready());
    }

    #[test]
    fn stale_stream_failure_leaves_new_connection_up() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let conn = manager_for(&listener, state.clone());
        conn.connect().unwrap();
        let (_first, _) = listener.accept().unwrap();
        let old = conn.current().unwrap();

        conn.connect().unwrap();
        let (_second, _) = listener.accept().unwrap();
        conn.drop_connection(&old, DisconnectReason::SocketError);
        assert!(state.connection_ready());

        let new = conn.current().unwrap();
        conn.drop_connection(&new, DisconnectReason::SocketError);
        assert!(!state.connection_ready());
    }

    #[test]
    fn host_name_falls_through_to_an_answering_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let state = Arc::new(LinkState::new());
        let cfg = Config {
            server_host: "localhost".into(),
            server_port: listener.local_addr().unwrap().port(),
            connect_timeout_secs: 2,
            ..Config::default()
        };
        let conn = ConnectionManager::new(&cfg, state.clone());
        assert!(!conn.resolve().unwrap().is_empty());

        conn.connect().unwrap();
        assert!(state.connection_ready());
        let (_server, peer) = listener.accept().unwrap();
        assert!(peer.ip().is_loopback());
    }
}
