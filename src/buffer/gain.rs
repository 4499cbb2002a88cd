use super::RingBuffer;

/// A [`RingBuffer`] of 16-bit PCM that can scale samples as it reads them.
///
/// Both read operations process whole 2-byte samples in the byte order given
/// at construction; an odd trailing byte in the destination is ignored. They
/// return `false` without touching the remaining destination bytes if the
/// buffer closes underneath them.
pub struct GainAwareBuffer {
    ring: RingBuffer,
    big_endian: bool,
}

impl GainAwareBuffer {
    pub fn new(capacity: usize, big_endian: bool) -> Self {
        assert!(capacity >= 2, "gain buffer must hold at least one sample");
        GainAwareBuffer {
            ring: RingBuffer::new(capacity),
            big_endian,
        }
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    // largest even request the ring can satisfy in one go
    fn step(&self) -> usize {
        self.ring.capacity() & !1
    }

    /// Read `dst.len()` bytes, multiplying every sample by `gain`.
    pub fn read_gain(&self, dst: &mut [u8], gain: f32) -> bool {
        let len = dst.len() & !1;
        let big_endian = self.big_endian;
        for chunk in dst[..len].chunks_mut(self.step()) {
            let ok = self.ring.consume(chunk.len(), |a, b| {
                let mut src = a.iter().chain(b).copied();
                for out in chunk.chunks_exact_mut(2) {
                    let raw = [src.next().unwrap_or(0), src.next().unwrap_or(0)];
                    let sample = decode(raw, big_endian) as f32;
                    out.copy_from_slice(&encode(clip(sample * gain), big_endian));
                }
            });
            if !ok {
                return false;
            }
        }
        true
    }

    /// Mix freshly read samples into the samples already in `dst`.
    ///
    /// Each output sample is
    /// `clip(global_gain * (first_gain * dst + second_gain * read))`, written
    /// back in place.
    pub fn read_merge_gain(
        &self,
        dst: &mut [u8],
        global_gain: f32,
        first_gain: f32,
        second_gain: f32,
    ) -> bool {
        let len = dst.len() & !1;
        let big_endian = self.big_endian;
        for chunk in dst[..len].chunks_mut(self.step()) {
            let ok = self.ring.consume(chunk.len(), |a, b| {
                let mut src = a.iter().chain(b).copied();
                for out in chunk.chunks_exact_mut(2) {
                    let first = decode([out[0], out[1]], big_endian) as f32;
                    let raw = [src.next().unwrap_or(0), src.next().unwrap_or(0)];
                    let second = decode(raw, big_endian) as f32;
                    let mixed = global_gain * (first_gain * first + second_gain * second);
                    out.copy_from_slice(&encode(clip(mixed), big_endian));
                }
            });
            if !ok {
                return false;
            }
        }
        true
    }
}

impl std::ops::Deref for GainAwareBuffer {
    type Target = RingBuffer;
    fn deref(&self) -> &Self::Target {
        &self.ring
    }
}

fn decode(raw: [u8; 2], big_endian: bool) -> i16 {
    if big_endian {
        i16::from_be_bytes(raw)
    } else {
        i16::from_le_bytes(raw)
    }
}

fn encode(sample: i16, big_endian: bool) -> [u8; 2] {
    if big_endian {
        sample.to_be_bytes()
    } else {
        sample.to_le_bytes()
    }
}

fn clip(value: f32) -> i16 {
    (value as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
