use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hyper::body::Bytes;
use hyper::header::{ACCEPT_RANGES, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot, watch};

use super::{PacedWriter, SinkState};
use crate::error::SinkError;
use crate::format::AudioFormat;
use crate::wav;

/// Chunks queued per connection before the writer blocks on the client.
const PEER_QUEUE: usize = 4;

/// Last byte offset addressable under the WAV unknown-length sentinel.
const STREAM_END: u64 = u32::MAX as u64 - 1;

/// Serves the stream as `audio/wav` over chunked HTTP to one client at a time.
///
/// `GET` on the configured path attaches the client as the current peer,
/// replacing any previous one. The WAV header goes out first unless the
/// request asks for a range starting past zero. While paused, `GET` is
/// answered with 416. `write` waits for a peer while the sink is started and
/// delivers through a [`PacedWriter`] at the format's byte rate.
pub struct HttpSink {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    server: Mutex<Option<Server>>,
}

struct Server {
    runtime: tokio::runtime::Runtime,
    shutdown: oneshot::Sender<()>,
}

struct Shared {
    path: String,
    handle: tokio::runtime::Handle,
    session: Mutex<Session>,
    ready: Condvar,
}

struct Session {
    state: SinkState,
    format: Option<AudioFormat>,
    peer: Option<Peer>,
    // bumped whenever the peer slot is replaced or emptied
    generation: u64,
}

struct Peer {
    writer: Option<PacedWriter<BodyWriter>>,
    hangup: watch::Sender<bool>,
}

impl Drop for Peer {
    fn drop(&mut self) {
        let _ = self.hangup.send(true);
    }
}

impl Session {
    fn drop_peer(&mut self) {
        self.peer = None;
        self.generation += 1;
    }
}

/// Blocking bridge from the sink's writer thread into a response body.
struct BodyWriter {
    sender: mpsc::Sender<std::io::Result<Bytes>>,
    hangup: watch::Receiver<bool>,
    handle: tokio::runtime::Handle,
}

impl std::io::Write for BodyWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let chunk = Bytes::copy_from_slice(buf);
        let sender = &self.sender;
        let hangup = &mut self.hangup;
        self.handle.block_on(async move {
            tokio::select! {
                sent = sender.send(Ok(chunk)) => sent.map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client went away")
                }),
                _ = hangup.changed() => Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionAborted,
                    "connection replaced or stopped",
                )),
            }
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ByteRange {
    start: u64,
    end: Option<u64>,
}

impl ByteRange {
    /// Parse the first range of a `bytes=` header. Suffix ranges and
    /// anything malformed are ignored.
    fn parse(value: &str) -> Option<Self> {
        let spec = value.trim().strip_prefix("bytes=")?;
        let first = spec.split(',').next()?.trim();
        let (start, end) = first.split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = match end.trim() {
            "" => None,
            end => Some(end.parse().ok()?),
        };
        if matches!(end, Some(end) if end < start) {
            return None;
        }
        Some(ByteRange { start, end })
    }

    /// Any `Range` header gets a partial response. One that cannot be
    /// used is answered as the whole stream from offset zero.
    fn from_header(value: &str) -> Self {
        Self::parse(value).unwrap_or(ByteRange {
            start: 0,
            end: None,
        })
    }

    fn content_range(&self) -> String {
        format!("bytes {}-{}/*", self.start, self.end.unwrap_or(STREAM_END))
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn respond(&self, req: Request<Body>) -> anyhow::Result<Response<Body>> {
        info!("got a {} request for {}", req.method(), req.uri());
        for (name, value) in req.headers() {
            debug!("header: {} value: {:?}", name, value);
        }

        if req.uri().path() != self.path {
            return status(StatusCode::NOT_FOUND);
        }
        let head = match *req.method() {
            Method::HEAD => true,
            Method::GET => false,
            _ => return status(StatusCode::METHOD_NOT_ALLOWED),
        };
        let range = req
            .headers()
            .get(RANGE)
            .map(|v| ByteRange::from_header(v.to_str().unwrap_or("")));

        let mut response = Response::builder()
            .status(if range.is_some() {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            })
            .header(CONTENT_TYPE, "audio/wav")
            .header(ACCEPT_RANGES, "bytes");
        if let Some(range) = range {
            response = response.header(CONTENT_RANGE, range.content_range());
        }

        // no body for HEAD, whatever the state
        if head {
            return Ok(response.body(Body::empty())?);
        }

        let mut session = self.lock();
        let format = match (session.state, session.format) {
            (SinkState::Paused, _) => {
                info!("paused, sending 416");
                return status(StatusCode::RANGE_NOT_SATISFIABLE);
            }
            (SinkState::Started | SinkState::Streaming, Some(format)) => format,
            _ => return status(StatusCode::SERVICE_UNAVAILABLE),
        };

        let (sender, receiver) = mpsc::channel(PEER_QUEUE);
        if range.map_or(true, |r| r.start == 0) {
            let header = wav::header_bytes(
                format.channels() as u32,
                format.bits_per_sample() as u32,
                format.sample_rate() as u64,
            )?;
            sender
                .try_send(Ok(Bytes::copy_from_slice(&header)))
                .map_err(|_| anyhow::anyhow!("could not queue wav header"))?;
            debug!("queued wav header");
        }

        let (hangup, hangup_rx) = watch::channel(false);
        let body = BodyWriter {
            sender,
            hangup: hangup_rx,
            handle: self.handle.clone(),
        };
        session.drop_peer();
        session.peer = Some(Peer {
            writer: Some(PacedWriter::new(body, format.byte_rate())),
            hangup,
        });
        session.state = SinkState::Started;
        self.ready.notify_all();
        info!("peer attached, byte rate {}", format.byte_rate());

        let stream = tokio_stream::wrappers::ReceiverStream::new(receiver);
        Ok(response.body(Body::wrap_stream(stream))?)
    }
}

fn status(code: StatusCode) -> anyhow::Result<Response<Body>> {
    Ok(Response::builder().status(code).body(Body::empty())?)
}

impl HttpSink {
    /// Bind the listening endpoint. The server runs on a private runtime
    /// until [`close`](super::Sink::close).
    pub fn bind(addr: SocketAddr, path: &str) -> Result<Self, SinkError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pcmcast-http")
            .enable_all()
            .build()?;
        let shared = Arc::new(Shared {
            path: path.to_owned(),
            handle: runtime.handle().clone(),
            session: Mutex::new(Session {
                state: SinkState::Uninitialized,
                format: None,
                peer: None,
                generation: 0,
            }),
            ready: Condvar::new(),
        });

        let service = {
            let shared = shared.clone();
            hyper::service::make_service_fn(move |_conn| {
                let shared = shared.clone();
                async move {
                    Ok::<_, anyhow::Error>(hyper::service::service_fn(move |req| {
                        let shared = shared.clone();
                        async move { shared.respond(req) }
                    }))
                }
            })
        };

        let server = {
            let _guard = runtime.enter();
            hyper::Server::try_bind(&addr)
                .map_err(|e| SinkError::Bind {
                    addr,
                    source: std::io::Error::new(std::io::ErrorKind::Other, e),
                })?
                .serve(service)
        };
        let local_addr = server.local_addr();
        let (shutdown, signal) = oneshot::channel::<()>();
        runtime.spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                let _ = signal.await;
            });
            if let Err(e) = graceful.await {
                warn!("http server error: {}", e);
            }
        });
        info!("started http server on {}", local_addr);

        Ok(HttpSink {
            shared,
            local_addr,
            server: Mutex::new(Some(Server { runtime, shutdown })),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl super::Sink for HttpSink {
    fn start(&self, format: &AudioFormat) -> Result<(), SinkError> {
        let mut session = self.shared.lock();
        if session.state == SinkState::Closed {
            return Err(SinkError::Closed);
        }
        session.drop_peer();
        session.format = Some(*format);
        session.state = SinkState::Started;
        self.shared.ready.notify_all();
        info!("http sink started: {}", format);
        Ok(())
    }

    fn write(&self, buffer: &[u8]) -> std::io::Result<()> {
        // wait for a peer, then take its writer so pacing happens unlocked
        let (mut writer, generation) = {
            let mut session = self.shared.lock();
            loop {
                if !session.state.is_live() {
                    return Ok(());
                }
                let generation = session.generation;
                if let Some(writer) = session.peer.as_mut().and_then(|p| p.writer.take()) {
                    break (writer, generation);
                }
                session = self
                    .shared
                    .ready
                    .wait(session)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let result = std::io::Write::write_all(&mut writer, buffer);

        let mut session = self.shared.lock();
        if session.generation != generation {
            // peer was replaced or stopped while we were writing
            return Ok(());
        }
        match result {
            Ok(()) => {
                if let Some(peer) = session.peer.as_mut() {
                    peer.writer = Some(writer);
                }
                if session.state == SinkState::Started {
                    session.state = SinkState::Streaming;
                }
            }
            Err(e) => {
                warn!("error writing to http stream: {}", e);
                session.drop_peer();
                if session.state.is_live() {
                    session.state = SinkState::Started;
                }
            }
        }
        self.shared.ready.notify_all();
        Ok(())
    }

    fn stop(&self) {
        let mut session = self.shared.lock();
        if session.state == SinkState::Closed {
            return;
        }
        session.drop_peer();
        session.state = SinkState::Paused;
        self.shared.ready.notify_all();
        info!("http sink paused");
    }

    fn close(&self) {
        {
            let mut session = self.shared.lock();
            session.drop_peer();
            session.state = SinkState::Closed;
            self.shared.ready.notify_all();
        }
        let server = self
            .server
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(server) = server {
            let _ = server.shutdown.send(());
            server.runtime.shutdown_timeout(Duration::from_secs(1));
            info!("http stream has been closed");
        }
    }

    fn state(&self) -> SinkState {
        self.shared.lock().state
    }
}

impl Drop for HttpSink {
    fn drop(&mut self) {
        super::Sink::close(self);
    }
}
