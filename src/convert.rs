use crate::error::ConvertError;
use crate::format::AudioFormat;

/// Converts PCM blocks between two layouts sharing a sample rate and
/// encoding.
///
/// Stages run in a fixed order, each skipped when not needed:
/// bit depth (8 <-> 16), mono to stereo duplication, then byte order swap.
/// 8-bit samples are unsigned with a bias of 128. After the bit depth stage
/// 16-bit samples are in the source byte order.
pub struct StreamConverter {
    from: AudioFormat,
    to: AudioFormat,
    mono_to_stereo: bool,
    swap_byte_order: bool,
    bits: Vec<u8>,
    stereo: Vec<u8>,
    swapped: Vec<u8>,
}

impl StreamConverter {
    pub fn can_convert(from: &AudioFormat, to: &AudioFormat) -> bool {
        from.matches(to) || from.compatible(to)
    }

    pub fn new(from: AudioFormat, to: AudioFormat) -> Result<Self, ConvertError> {
        if !Self::can_convert(&from, &to) {
            return Err(ConvertError::Incompatible {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let mono_to_stereo = match (from.channels(), to.channels()) {
            (a, b) if a == b => false,
            (1, 2) => true,
            (from, to) => return Err(ConvertError::Channels { from, to }),
        };
        Ok(StreamConverter {
            from,
            to,
            mono_to_stereo,
            swap_byte_order: from.is_big_endian() != to.is_big_endian(),
            bits: Vec::new(),
            stereo: Vec::new(),
            swapped: Vec::new(),
        })
    }

    /// Convert one block. The result borrows either `block` itself (when no
    /// stage applies) or an internal buffer reused across calls.
    pub fn convert<'a>(&'a mut self, block: &'a [u8]) -> &'a [u8] {
        let mut current = block;

        match (self.from.bits_per_sample(), self.to.bits_per_sample()) {
            (16, 8) => {
                narrow(current, &mut self.bits, self.from.is_big_endian());
                current = &self.bits;
            }
            (8, 16) => {
                widen(current, &mut self.bits, self.from.is_big_endian());
                current = &self.bits;
            }
            _ => {}
        }

        if self.mono_to_stereo {
            duplicate(current, &mut self.stereo, self.to.sample_size());
            current = &self.stereo;
        }

        if self.swap_byte_order {
            swap(
                current,
                &mut self.swapped,
                self.to.sample_size(),
                self.to.channels() as usize,
            );
            current = &self.swapped;
        }

        current
    }
}

fn narrow(src: &[u8], dst: &mut Vec<u8>, big_endian: bool) {
    dst.clear();
    dst.extend(src.chunks_exact(2).map(|raw| {
        let raw = [raw[0], raw[1]];
        let sample = if big_endian {
            i16::from_be_bytes(raw)
        } else {
            i16::from_le_bytes(raw)
        };
        let normal = sample as f32 / 32768.0;
        let value = ((normal * 128.0) as i32).clamp(-128, 127);
        (value + 128) as u8
    }));
}

fn widen(src: &[u8], dst: &mut Vec<u8>, big_endian: bool) {
    dst.clear();
    for byte in src {
        let normal = (*byte as i32 - 128) as f32 / 128.0;
        let value = ((normal * 32768.0) as i32).clamp(-32768, 32767) as i16;
        if big_endian {
            dst.extend_from_slice(&value.to_be_bytes());
        } else {
            dst.extend_from_slice(&value.to_le_bytes());
        }
    }
}

fn duplicate(src: &[u8], dst: &mut Vec<u8>, sample_size: usize) {
    dst.clear();
    dst.reserve(src.len() * 2);
    for sample in src.chunks_exact(sample_size) {
        dst.extend_from_slice(sample);
        dst.extend_from_slice(sample);
    }
}

fn swap(src: &[u8], dst: &mut Vec<u8>, sample_size: usize, channels: usize) {
    let frame = sample_size * channels;
    let len = src.len() - src.len() % frame;
    dst.clear();
    for sample in src[..len].chunks_exact(sample_size) {
        dst.extend(sample.iter().rev());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn format(bits: u16, channels: u16, big_endian: bool) -> AudioFormat {
        AudioFormat::new(44100, bits, channels, big_endian).unwrap()
    }

    fn le16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples_le16(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn rejects_unsupported_pairs() {
        let cd = format(16, 2, false);
        let other_rate = AudioFormat::new(48000, 16, 2, false).unwrap();
        assert!(!StreamConverter::can_convert(&cd, &other_rate));
        assert!(matches!(
            StreamConverter::new(cd, other_rate),
            Err(ConvertError::Incompatible { .. })
        ));
        assert!(matches!(
            StreamConverter::new(cd, format(16, 1, false)),
            Err(ConvertError::Channels { from: 2, to: 1 })
        ));
    }

    #[test]
    fn identity() {
        let mut conv = StreamConverter::new(format(16, 2, false), format(16, 2, false)).unwrap();
        let block = le16(&[1, -2, 3, -4]);
        assert_eq!(conv.convert(&block), &block[..]);
    }

    #[test]
    fn bit_depth_round_trip() {
        let samples: Vec<i16> = vec![0, 1, -1, 255, -256, 12345, -12345, i16::MAX, i16::MIN];
        let block = le16(&samples);

        let mut down = StreamConverter::new(format(16, 1, false), format(8, 1, false)).unwrap();
        let mut up = StreamConverter::new(format(8, 1, false), format(16, 1, false)).unwrap();
        let narrow = down.convert(&block).to_vec();
        assert_eq!(narrow.len(), samples.len());
        assert_eq!(narrow[0], 128);

        let back = samples_le16(up.convert(&narrow));
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((*a as i32 - *b as i32).abs() < 256, "{} vs {}", a, b);
        }
    }

    #[test]
    fn mono_to_stereo() {
        let mut conv = StreamConverter::new(format(16, 1, false), format(16, 2, false)).unwrap();
        let block = le16(&[10, -20, 30]);
        let out = samples_le16(conv.convert(&block));
        assert_eq!(out.len(), 6);
        for frame in out.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        assert_eq!(out, vec![10, 10, -20, -20, 30, 30]);
    }

    #[test]
    fn byte_swap_discards_partial_frame() {
        let mut conv = StreamConverter::new(format(16, 2, false), format(16, 2, true)).unwrap();
        let block = [1, 2, 3, 4, 5, 6];
        assert_eq!(conv.convert(&block), &[2, 1, 4, 3][..]);
        // reused with a different block length
        let block = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(conv.convert(&block), &[2, 1, 4, 3, 6, 5, 8, 7][..]);
    }

    #[test]
    fn all_stages() {
        let mut conv = StreamConverter::new(format(8, 1, false), format(16, 2, true)).unwrap();
        // 8-bit unsigned: 128 is silence, 192 is +0.5, 64 is -0.5
        let out = conv.convert(&[128, 192, 64]).to_vec();
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_be_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![0, 0, 16384, 16384, -16384, -16384]);
    }

    #[test]
    fn big_endian_source_narrows() {
        let mut conv = StreamConverter::new(format(16, 1, true), format(8, 1, true)).unwrap();
        let block: Vec<u8> = 16384i16.to_be_bytes().to_vec();
        assert_eq!(conv.convert(&block), &[192][..]);
    }
}
