// radio/udp.rs: bench stand-in for the transceiver, one datagram per radio frame
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;

use tracing::{debug, info};

use super::{RadioIdentity, RadioLink};
use crate::config::Config;
use crate::errors::RadioError;

pub struct UdpRadio {
    device: String,
    bind: String,
    peer: String,
    part: u16,
    sock: Option<UdpSocket>,
    streaming: bool,
}

impl UdpRadio {
    pub fn new(device: impl Into<String>, bind: impl Into<String>, peer: impl Into<String>, part: u16) -> Self {
        Self {
            device: device.into(),
            bind: bind.into(),
            peer: peer.into(),
            part,
            sock: None,
            streaming: false,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.radio_device, &cfg.radio_bind, &cfg.radio_peer, cfg.radio_part)
    }

    fn socket(&self) -> Result<&UdpSocket, RadioError> {
        self.sock
            .as_ref()
            .ok_or_else(|| RadioError::Fault(format!("{} not initialised", self.device)))
    }
}

impl RadioLink for UdpRadio {
    fn init(&mut self) -> Result<(), RadioError> {
        let sock = UdpSocket::bind(&self.bind)?;
        sock.connect(&self.peer)?;
        info!(device = %self.device, local = ?sock.local_addr().ok(), peer = %self.peer, "udp radio up");
        self.sock = Some(sock);
        self.streaming = false;
        Ok(())
    }

    fn identity(&mut self) -> Result<RadioIdentity, RadioError> {
        self.socket()?;
        Ok(RadioIdentity {
            part: self.part,
            revision: 0,
        })
    }

    fn enable_streaming(&mut self) -> Result<(), RadioError> {
        self.socket()?;
        self.streaming = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], max_wait: Duration) -> Result<usize, RadioError> {
        if !self.streaming {
            return Err(RadioError::Fault(format!("{} not streaming", self.device)));
        }
        let sock = self.socket()?;
        // a zero timeout would block forever
        sock.set_read_timeout(Some(max_wait.max(Duration::from_millis(1))))?;
        match sock.recv(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(0),
            // nobody listening on the peer port yet
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), RadioError> {
        let n = self.socket()?.send(frame)?;
        if n != frame.len() {
            return Err(RadioError::Io(std::io::Error::new(
                ErrorKind::WriteZero,
                format!("radio took {n} of {} bytes", frame.len()),
            )));
        }
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), RadioError> {
        debug!(device = %self.device, "udp radio sleep");
        self.streaming = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_cross_as_datagrams() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut radio = UdpRadio::new("bench", "127.0.0.1:0", peer.local_addr().unwrap().to_string(), 0x4463);

        radio.init().unwrap();
        assert_eq!(radio.identity().unwrap().part, 0x4463);
        radio.enable_streaming().unwrap();

        let local = radio.sock.as_ref().unwrap().local_addr().unwrap();
        peer.send_to(&[7u8; 64], local).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(radio.read(&mut buf, Duration::from_secs(2)).unwrap(), 64);
        assert_eq!(buf, [7u8; 64]);

        radio.write(&[9u8; 64]).unwrap();
        let mut got = [0u8; 128];
        let (n, _) = peer.recv_from(&mut got).unwrap();
        assert_eq!(&got[..n], &[9u8; 64]);
    }

    #[test]
    fn quiet_link_reads_zero() {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut radio = UdpRadio::new("bench", "127.0.0.1:0", peer.local_addr().unwrap().to_string(), 0x4463);
        radio.init().unwrap();
        radio.enable_streaming().unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(radio.read(&mut buf, Duration::from_millis(20)).unwrap(), 0);
    }

    #[test]
    fn uninitialised_radio_is_a_fault() {
        let mut radio = UdpRadio::new("bench", "127.0.0.1:0", "127.0.0.1:9", 0x4463);
        assert!(radio.identity().unwrap_err().is_fault());
        assert!(radio.write(&[0u8; 64]).unwrap_err().is_fault());
        let mut buf = [0u8; 64];
        assert!(radio.read(&mut buf, Duration::from_millis(1)).unwrap_err().is_fault());
    }
}
