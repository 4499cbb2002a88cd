use std::io::Write;
use std::thread::sleep;
use std::time::{Duration, Instant};

use log::trace;

/// Time source for [`PacedWriter`].
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        sleep(duration)
    }
}

/// Writes through to `inner` no faster than a fixed byte rate.
///
/// Every write may go out immediately up to the budget earned since the
/// session started; the rest waits until enough time has passed. Delivering
/// K bytes therefore never takes less than K / rate seconds, measured from
/// construction or the last [`reset`](PacedWriter::reset).
///
/// Once a write to `inner` fails the session is broken and every further
/// write fails with [`std::io::ErrorKind::BrokenPipe`]. Owners are expected
/// to throw the writer away and build a new one.
pub struct PacedWriter<W, C = SystemClock> {
    inner: W,
    clock: C,
    start: Instant,
    written: u64,
    bytes_per_ms: f64,
    broken: bool,
}

impl<W> PacedWriter<W>
where
    W: Write,
{
    pub fn new(inner: W, bytes_per_second: u64) -> Self {
        Self::with_clock(inner, bytes_per_second, SystemClock)
    }
}

impl<W, C> PacedWriter<W, C>
where
    W: Write,
    C: Clock,
{
    pub fn with_clock(inner: W, bytes_per_second: u64, clock: C) -> Self {
        assert!(bytes_per_second > 0, "pacing rate must be nonzero");
        PacedWriter {
            start: clock.now(),
            inner,
            clock,
            written: 0,
            bytes_per_ms: bytes_per_second as f64 / 1000.0,
            broken: false,
        }
    }

    /// Start a fresh pacing session.
    pub fn reset(&mut self) {
        self.start = self.clock.now();
        self.written = 0;
        self.broken = false;
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let result = self
            .inner
            .write_all(bytes)
            .and_then(|_| self.inner.flush());
        match result {
            Ok(()) => {
                self.written += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.broken = true;
                Err(e)
            }
        }
    }
}

impl<W, C> Write for PacedWriter<W, C>
where
    W: Write,
    C: Clock,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.broken {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "paced session is broken",
            ));
        }

        let elapsed = self.clock.now().saturating_duration_since(self.start);
        let allowed = elapsed.as_secs_f64() * 1000.0 * self.bytes_per_ms;
        let budget = (allowed - self.written as f64).max(0.0) as usize;

        let now = buf.len().min(budget);
        if now > 0 {
            self.send(&buf[..now])?;
        }

        let remaining = buf.len() - now;
        if remaining > 0 {
            let wait = Duration::from_secs_f64(remaining as f64 / self.bytes_per_ms / 1000.0);
            trace!("paced {} bytes now, {} after {:?}", now, remaining, wait);
            self.clock.sleep(wait);
            self.send(&buf[now..])?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ManualClock {
        base: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl ManualClock {
        fn new() -> Self {
            ManualClock {
                base: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        fn elapsed(&self) -> Duration {
            *self.offset.lock().unwrap()
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + self.elapsed()
        }

        fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }

    struct FailAfter {
        left: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.len() > self.left {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "reset",
                ));
            }
            self.left -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn never_faster_than_rate() {
        let clock = ManualClock::new();
        let rate = 1000;
        let mut w = PacedWriter::with_clock(Vec::new(), rate, clock.clone());

        let mut total = 0u64;
        for size in [500, 1, 999, 2048, 7, 333, 4000] {
            let data = vec![0x5a; size];
            w.write_all(&data).unwrap();
            total += size as u64;
            // 1 ms of scheduling slack for float rounding
            let floor = Duration::from_millis(total * 1000 / rate);
            assert!(clock.elapsed() + Duration::from_millis(1) >= floor);
        }
        assert_eq!(w.bytes_written(), total);
        assert_eq!(w.get_ref().len() as u64, total);
    }

    #[test]
    fn initial_burst_after_idle() {
        let clock = ManualClock::new();
        let mut w = PacedWriter::with_clock(Vec::new(), 1000, clock.clone());
        clock.advance(Duration::from_secs(2));
        w.write_all(&[1; 1500]).unwrap();
        // earned budget covered everything, no sleep
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn reset_discards_budget() {
        let clock = ManualClock::new();
        let mut w = PacedWriter::with_clock(Vec::new(), 1000, clock.clone());
        clock.advance(Duration::from_secs(2));
        w.reset();
        w.write_all(&[1; 500]).unwrap();
        assert!(clock.elapsed() >= Duration::from_millis(2499));
        assert_eq!(w.bytes_written(), 500);
    }

    #[test]
    fn failure_breaks_session() {
        let clock = ManualClock::new();
        let mut w = PacedWriter::with_clock(FailAfter { left: 10 }, 1000, clock);
        assert!(w.write_all(&[0; 8]).is_ok());
        assert!(w.write_all(&[0; 8]).is_err());
        assert!(w.is_broken());
        let err = w.write_all(&[0; 1]).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn wall_clock_lower_bound() {
        let mut w = PacedWriter::new(Vec::new(), 8000);
        let start = Instant::now();
        for _ in 0..4 {
            w.write_all(&[0; 200]).unwrap();
        }
        // 800 bytes at 8000 B/s
        assert!(start.elapsed() >= Duration::from_millis(95));
    }
}
