use crate::error::FormatError;

/// Sample encoding tag. Formats with different encodings are never converted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    PcmSigned,
    PcmUnsigned,
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::PcmSigned => write!(f, "PCM_SIGNED"),
            Encoding::PcmUnsigned => write!(f, "PCM_UNSIGNED"),
        }
    }
}

/// Layout of a PCM byte stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    sample_rate: u32,
    bits_per_sample: u16,
    channels: u16,
    big_endian: bool,
    encoding: Encoding,
}

impl AudioFormat {
    pub fn new(
        sample_rate: u32,
        bits_per_sample: u16,
        channels: u16,
        big_endian: bool,
    ) -> Result<Self, FormatError> {
        Self::with_encoding(
            sample_rate,
            bits_per_sample,
            channels,
            big_endian,
            Encoding::PcmSigned,
        )
    }

    pub fn with_encoding(
        sample_rate: u32,
        bits_per_sample: u16,
        channels: u16,
        big_endian: bool,
        encoding: Encoding,
    ) -> Result<Self, FormatError> {
        if sample_rate == 0 {
            return Err(FormatError::ZeroSampleRate);
        }
        if channels == 0 {
            return Err(FormatError::ZeroChannels);
        }
        if bits_per_sample != 8 && bits_per_sample != 16 {
            return Err(FormatError::UnsupportedBits(bits_per_sample));
        }
        Ok(AudioFormat {
            sample_rate,
            bits_per_sample,
            channels,
            big_endian,
            encoding,
        })
    }

    /// 44.1kHz, 16 bit, stereo, little endian.
    pub fn cd_quality() -> Self {
        AudioFormat {
            sample_rate: 44100,
            bits_per_sample: 16,
            channels: 2,
            big_endian: false,
            encoding: Encoding::PcmSigned,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Bytes in a single sample of a single channel.
    pub fn sample_size(&self) -> usize {
        (self.bits_per_sample as usize + 7) / 8
    }

    /// Bytes in one frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.sample_size() * self.channels as usize
    }

    /// Bytes per second of playback.
    pub fn byte_rate(&self) -> u64 {
        self.channels as u64 * self.bits_per_sample as u64 * self.sample_rate as u64 / 8
    }

    pub fn matches(&self, other: &AudioFormat) -> bool {
        self == other
    }

    /// Same encoding and sample rate. Everything else can be bridged by a
    /// [`StreamConverter`](crate::StreamConverter).
    pub fn compatible(&self, other: &AudioFormat) -> bool {
        self.encoding == other.encoding && self.sample_rate == other.sample_rate
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} Hz, {} bit, {} channels, {}",
            self.encoding,
            self.sample_rate,
            self.bits_per_sample,
            self.channels,
            if self.big_endian {
                "big-endian"
            } else {
                "little-endian"
            }
        )
    }
}
