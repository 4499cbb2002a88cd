use std::net::{SocketAddr, UdpSocket};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::sleep;
use std::time::Duration;

use log::{info, warn};

use super::SinkState;
use crate::error::SinkError;
use crate::format::AudioFormat;
use crate::wav;

/// Best-effort datagram output.
///
/// `start` sends the WAV header as one datagram, then every `write` becomes
/// one datagram followed by a fixed delay. Nothing is acknowledged or
/// retried; a failed send only gets logged. Writes larger than a datagram
/// can carry are dropped by the network stack the same way.
pub struct UdpSink {
    destination: SocketAddr,
    delay: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    socket: Option<UdpSocket>,
    state: SinkState,
}

impl UdpSink {
    pub fn new(destination: SocketAddr, delay: Duration) -> Self {
        UdpSink {
            destination,
            delay,
            inner: Mutex::new(Inner {
                socket: None,
                state: SinkState::Uninitialized,
            }),
        }
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind(&self) -> std::io::Result<UdpSocket> {
        let local: SocketAddr = if self.destination.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        UdpSocket::bind(local)
    }
}

impl super::Sink for UdpSink {
    fn start(&self, format: &AudioFormat) -> Result<(), SinkError> {
        let mut inner = self.lock();
        if inner.state == SinkState::Closed {
            return Err(SinkError::Closed);
        }
        if inner.socket.is_none() {
            inner.socket = Some(self.bind()?);
        }
        let header = wav::header_bytes(
            format.channels() as u32,
            format.bits_per_sample() as u32,
            format.sample_rate() as u64,
        )?;
        if let Some(socket) = inner.socket.as_ref() {
            socket.send_to(&header, self.destination)?;
        }
        inner.state = SinkState::Started;
        info!("udp sink started towards {}: {}", self.destination, format);
        Ok(())
    }

    fn write(&self, buffer: &[u8]) -> std::io::Result<()> {
        {
            let mut inner = self.lock();
            if !inner.state.is_live() {
                return Ok(());
            }
            if let Some(socket) = inner.socket.as_ref() {
                if let Err(e) = socket.send_to(buffer, self.destination) {
                    warn!("dropped {} byte datagram: {}", buffer.len(), e);
                }
            }
            inner.state = SinkState::Streaming;
        }
        sleep(self.delay);
        Ok(())
    }

    fn stop(&self) {
        let mut inner = self.lock();
        if inner.state.is_live() {
            inner.state = SinkState::Paused;
        }
    }

    fn close(&self) {
        let mut inner = self.lock();
        inner.socket = None;
        inner.state = SinkState::Closed;
    }

    fn state(&self) -> SinkState {
        self.lock().state
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sink::Sink;

    fn receiver() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        socket
    }

    #[test]
    fn header_then_datagrams() {
        let rx = receiver();
        let sink = UdpSink::new(rx.local_addr().unwrap(), Duration::ZERO);
        assert_eq!(sink.destination(), rx.local_addr().unwrap());
        let mut buf = [0u8; 1024];

        sink.start(&AudioFormat::cd_quality()).unwrap();
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(n, wav::HEADER_LEN);
        assert_eq!(&buf[..4], b"RIFF");

        sink.write(&[1, 2, 3]).unwrap();
        sink.write(&[4, 5]).unwrap();
        assert_eq!(sink.state(), SinkState::Streaming);
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[4, 5]);
    }

    #[test]
    fn paused_writes_are_dropped() {
        let rx = receiver();
        let sink = UdpSink::new(rx.local_addr().unwrap(), Duration::ZERO);
        let mut buf = [0u8; 1024];

        // nothing goes out before start
        sink.write(&[9]).unwrap();
        assert!(rx.recv(&mut buf).is_err());

        sink.start(&AudioFormat::cd_quality()).unwrap();
        rx.recv(&mut buf).unwrap();
        sink.stop();
        assert_eq!(sink.state(), SinkState::Paused);
        sink.write(&[9]).unwrap();
        assert!(rx.recv(&mut buf).is_err());

        // restarting resends the header
        sink.start(&AudioFormat::cd_quality()).unwrap();
        let n = rx.recv(&mut buf).unwrap();
        assert_eq!(n, wav::HEADER_LEN);

        sink.close();
        assert!(sink.start(&AudioFormat::cd_quality()).is_err());
    }
}
