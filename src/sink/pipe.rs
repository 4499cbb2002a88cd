use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::sleep;
use std::time::Duration;

use log::{debug, info, warn};

use super::SinkState;
use crate::error::SinkError;
use crate::format::AudioFormat;

/// Bytes buffered before they reach the pipe. Below `PIPE_BUF`, so every
/// flush lands in the pipe whole or not at all.
const PIPE_BUFFER: usize = 3600;

/// Raw PCM into a file or named pipe, without a header.
///
/// A missing path is created as a named pipe. Opening a pipe nobody reads
/// yet is not an error: data is dropped and the open is retried on the next
/// write, as it is after the reader goes away. The descriptor stays
/// non-blocking, so a reader that stops reading only costs the audio that no
/// longer fits. Each write is followed by a sleep lasting as long as the
/// audio it carried.
pub struct PipeSink {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    writer: Option<BufWriter<File>>,
    byte_rate: u64,
    state: SinkState,
}

impl Inner {
    // throw away buffered audio but keep the descriptor, so the reader
    // never sees end of file
    fn discard(&mut self) {
        if let Some(writer) = self.writer.take() {
            let (file, _) = writer.into_parts();
            self.writer = Some(BufWriter::with_capacity(PIPE_BUFFER, file));
        }
    }

    fn playback_time(&self, len: usize) -> Duration {
        if self.byte_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(len as f64 / self.byte_rate as f64)
    }
}

impl PipeSink {
    pub fn new<P>(path: P) -> Self
    where
        P: AsRef<Path>,
    {
        PipeSink {
            path: path.as_ref().to_owned(),
            inner: Mutex::new(Inner {
                writer: None,
                byte_rate: 0,
                state: SinkState::Uninitialized,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_exists(&self) -> std::io::Result<()> {
        if !self.path.exists() {
            create_fifo(&self.path)?;
            info!("created pipe: {:?}", self.path);
        }
        Ok(())
    }

    fn open(&self) -> std::io::Result<BufWriter<File>> {
        let file = open_for_writing(&self.path)?;
        Ok(BufWriter::with_capacity(PIPE_BUFFER, file))
    }

    fn failed(&self, inner: &mut Inner, e: std::io::Error) {
        if e.kind() == ErrorKind::WouldBlock {
            debug!("{:?} is full, dropping audio", self.path);
            inner.discard();
        } else {
            warn!("error writing to {:?}: {}", self.path, e);
            inner.writer = None;
            if inner.state.is_live() {
                inner.state = SinkState::Started;
            }
        }
    }
}

#[cfg(unix)]
fn create_fifo(path: &Path) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e))?;
    let ret = unsafe { libc::mkfifo(cpath.as_ptr(), 0o644) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn create_fifo(path: &Path) -> std::io::Result<()> {
    File::create(path).map(|_| ())
}

// Opening without a reader fails with ENXIO instead of blocking.
#[cfg(unix)]
fn open_for_writing(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .append(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_for_writing(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().append(true).open(path)
}

impl super::Sink for PipeSink {
    fn start(&self, format: &AudioFormat) -> Result<(), SinkError> {
        let mut inner = self.lock();
        if inner.state == SinkState::Closed {
            return Err(SinkError::Closed);
        }
        self.ensure_exists()?;
        inner.byte_rate = format.byte_rate();
        inner.state = SinkState::Started;
        info!(
            "pipe sink started on {:?}: {} ({} bytes/s)",
            self.path,
            format,
            format.byte_rate()
        );
        Ok(())
    }

    fn write(&self, buffer: &[u8]) -> std::io::Result<()> {
        let pause = {
            let mut inner = self.lock();
            if !inner.state.is_live() {
                return Ok(());
            }
            if inner.writer.is_none() {
                match self.open() {
                    Ok(writer) => {
                        info!("opened {:?} for writing", self.path);
                        inner.writer = Some(writer);
                    }
                    Err(e) => debug!("{:?} not ready, dropping audio: {}", self.path, e),
                }
            }
            if let Some(writer) = inner.writer.as_mut() {
                // pieces no larger than the buffer keep every flush atomic
                let result = buffer
                    .chunks(PIPE_BUFFER)
                    .try_for_each(|piece| writer.write_all(piece));
                match result {
                    Ok(()) => inner.state = SinkState::Streaming,
                    Err(e) => self.failed(&mut inner, e),
                }
            }
            inner.playback_time(buffer.len())
        };
        sleep(pause);
        Ok(())
    }

    fn stop(&self) {
        self.drain();
        let mut inner = self.lock();
        if inner.state.is_live() {
            inner.state = SinkState::Paused;
        }
    }

    fn drain(&self) {
        let mut inner = self.lock();
        if let Some(writer) = inner.writer.as_mut() {
            if let Err(e) = writer.flush() {
                self.failed(&mut inner, e);
            }
        }
    }

    fn close(&self) {
        self.drain();
        let mut inner = self.lock();
        inner.writer = None;
        inner.state = SinkState::Closed;
    }

    fn state(&self) -> SinkState {
        self.lock().state
    }
}
