mod http;
mod paced;
mod pipe;
mod udp;

pub use http::HttpSink;
pub use paced::{Clock, PacedWriter, SystemClock};
pub use pipe::PipeSink;
pub use udp::UdpSink;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SinkError;
use crate::format::AudioFormat;

/// Lifecycle of a sink's logical stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Started,
    Streaming,
    Paused,
    Closed,
}

impl SinkState {
    /// Whether writes in this state can reach a peer.
    pub fn is_live(&self) -> bool {
        matches!(self, SinkState::Started | SinkState::Streaming)
    }
}

/// An output endpoint for PCM bytes.
///
/// All operations are callable from any thread. `write` never reports
/// transient delivery problems: data that cannot be delivered (no peer,
/// paused, disconnected) is dropped and `Ok(())` is returned.
pub trait Sink: Send + Sync {
    /// Begin a new logical stream in `format`, resetting all per-session state.
    fn start(&self, format: &AudioFormat) -> Result<(), SinkError>;

    fn write(&self, buffer: &[u8]) -> std::io::Result<()>;

    /// Pause: drop the current downstream stream but stay ready for `start`.
    fn stop(&self) {}

    /// Push out anything buffered.
    fn drain(&self) {}

    /// Release every resource. Idempotent.
    fn close(&self);

    fn state(&self) -> SinkState;
}

impl Sink for Box<dyn Sink> {
    fn start(&self, format: &AudioFormat) -> Result<(), SinkError> {
        (**self).start(format)
    }

    fn write(&self, buffer: &[u8]) -> std::io::Result<()> {
        (**self).write(buffer)
    }

    fn stop(&self) {
        (**self).stop()
    }

    fn drain(&self) {
        (**self).drain()
    }

    fn close(&self) {
        (**self).close()
    }

    fn state(&self) -> SinkState {
        (**self).state()
    }
}

pub const DEFAULT_HTTP_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 50001);
pub const DEFAULT_UDP_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 50005);
pub const DEFAULT_UDP_DELAY: Duration = Duration::from_millis(100);

/// Configured output, selected once at startup.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    Http { addr: SocketAddr, path: String },
    Udp { addr: SocketAddr, delay: Duration },
    Pipe { path: PathBuf },
}

impl Output {
    pub fn to_sink(&self) -> anyhow::Result<Box<dyn Sink>> {
        let sink: Box<dyn Sink> = match self {
            Output::Http { addr, path } => Box::new(HttpSink::bind(*addr, path)?),
            Output::Udp { addr, delay } => Box::new(UdpSink::new(*addr, *delay)),
            Output::Pipe { path } => Box::new(PipeSink::new(path)),
        };
        Ok(sink)
    }
}

impl std::str::FromStr for Output {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "http" {
            return Ok(Output::Http {
                addr: DEFAULT_HTTP_ADDR.into(),
                path: "/".to_owned(),
            });
        }
        if s == "udp" {
            return Ok(Output::Udp {
                addr: DEFAULT_UDP_ADDR.into(),
                delay: DEFAULT_UDP_DELAY,
            });
        }
        if let Some(rest) = s.strip_prefix("http://") {
            let (host, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            return Ok(Output::Http {
                addr: resolve(host)?,
                path: path.to_owned(),
            });
        }
        if let Some(rest) = s.strip_prefix("udp://") {
            return Ok(Output::Udp {
                addr: resolve(rest)?,
                delay: DEFAULT_UDP_DELAY,
            });
        }
        let path = s.strip_prefix("pipe:").unwrap_or(s);
        if path.is_empty() {
            anyhow::bail!("empty output path");
        }
        Ok(Output::Pipe { path: path.into() })
    }
}

fn resolve(host: &str) -> anyhow::Result<SocketAddr> {
    host.to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("could not resolve {:?}", host))
}
