use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Fixed-capacity blocking byte queue.
///
/// Writers block while there is not enough free space, readers block until
/// the full request is available. Closing the buffer is permanent and
/// releases every blocked thread; afterwards reads and writes return
/// immediately without touching data.
///
/// Requests larger than the capacity are served in capacity-sized pieces,
/// each of which follows the same rules.
pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
    space: Condvar,
    data: Condvar,
}

struct Inner {
    buf: Box<[u8]>,
    read: usize,
    len: usize,
    closed: bool,
}

impl Inner {
    fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    fn push(&mut self, bytes: &[u8]) {
        let cap = self.buf.len();
        let start = (self.read + self.len) % cap;
        let first = bytes.len().min(cap - start);
        self.buf[start..start + first].copy_from_slice(&bytes[..first]);
        self.buf[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.len += bytes.len();
    }

    // unread region as (up to) two contiguous slices
    fn peek(&self, len: usize) -> (&[u8], &[u8]) {
        let cap = self.buf.len();
        let first = len.min(cap - self.read);
        (
            &self.buf[self.read..self.read + first],
            &self.buf[..len - first],
        )
    }

    fn advance(&mut self, len: usize) {
        self.read = (self.read + len) % self.buf.len();
        self.len -= len;
    }
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be nonzero");
        RingBuffer {
            capacity,
            inner: Mutex::new(Inner {
                buf: vec![0; capacity].into_boxed_slice(),
                read: 0,
                len: 0,
                closed: false,
            }),
            space: Condvar::new(),
            data: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Bytes written but not yet read.
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until at most `level` bytes remain unread. Returns `false` if
    /// the buffer was closed while waiting.
    pub fn wait_below(&self, level: usize) -> bool {
        let inner = self
            .space
            .wait_while(self.lock(), |inner| !inner.closed && inner.len > level)
            .unwrap_or_else(PoisonError::into_inner);
        !inner.closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_data<'a>(&self, guard: MutexGuard<'a, Inner>, len: usize) -> MutexGuard<'a, Inner> {
        self.data
            .wait_while(guard, |inner| !inner.closed && inner.len < len)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy all of `bytes` into the buffer, blocking for space as needed.
    ///
    /// Returns `false` if the buffer was closed before everything went in.
    pub fn write(&self, mut bytes: &[u8]) -> bool {
        let mut inner = self.lock();
        while !bytes.is_empty() {
            let piece = bytes.len().min(self.capacity);
            inner = self
                .space
                .wait_while(inner, |inner| !inner.closed && inner.free() < piece)
                .unwrap_or_else(PoisonError::into_inner);
            if inner.closed {
                return false;
            }
            inner.push(&bytes[..piece]);
            self.data.notify_all();
            bytes = &bytes[piece..];
        }
        !inner.closed
    }

    /// Fill `buf` completely, blocking until enough data arrives.
    ///
    /// Returns `false` (with `buf` in an unspecified state) if the buffer
    /// was closed.
    pub fn read_exact(&self, buf: &mut [u8]) -> bool {
        let mut inner = self.lock();
        let mut done = 0;
        while done < buf.len() {
            let piece = (buf.len() - done).min(self.capacity);
            inner = self.wait_data(inner, piece);
            if inner.closed {
                return false;
            }
            let (a, b) = inner.peek(piece);
            buf[done..done + a.len()].copy_from_slice(a);
            buf[done + a.len()..done + piece].copy_from_slice(b);
            inner.advance(piece);
            self.space.notify_all();
            done += piece;
        }
        !inner.closed
    }

    /// Read exactly `len` bytes, or nothing if the buffer closes first.
    pub fn read(&self, len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        if self.read_exact(&mut out) {
            out
        } else {
            Vec::new()
        }
    }

    /// Wait for `len` bytes (at most the capacity) and hand them to `f` as
    /// two slices, in order, without copying. The bytes are consumed once
    /// `f` returns.
    pub(crate) fn consume<F>(&self, len: usize, f: F) -> bool
    where
        F: FnOnce(&[u8], &[u8]),
    {
        debug_assert!(len <= self.capacity);
        let mut inner = self.wait_data(self.lock(), len);
        if inner.closed {
            return false;
        }
        let (a, b) = inner.peek(len);
        f(a, b);
        inner.advance(len);
        self.space.notify_all();
        true
    }

    /// Drop everything that has not been read yet.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.read = 0;
        inner.len = 0;
        self.space.notify_all();
    }

    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        self.space.notify_all();
        self.data.notify_all();
    }
}
