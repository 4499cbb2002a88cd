/// Test tone, optionally limited to a number of frames.
pub struct Sine {
    samplerate: f32,
    channels: u16,
    omega: f32,
    amplitude: f32,
    sample: u64,
    channel: u16,
    frames: Option<u64>,
}

impl Sine {
    pub fn new(samplerate: f32, channels: u16, frequency: f32) -> Self {
        Sine {
            samplerate,
            channels,
            omega: 2.0 * std::f32::consts::PI * frequency,
            amplitude: 1.0,
            sample: 0,
            channel: 0,
            frames: None,
        }
    }

    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Stop after `seconds` of audio.
    pub fn seconds(mut self, seconds: f32) -> Self {
        self.frames = Some((seconds * self.samplerate) as u64);
        self
    }
}

impl super::Source for Sine {
    fn samplerate(&self) -> f32 {
        self.samplerate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn fill(&mut self, buffer: &mut [f32]) -> usize {
        let mut written = 0;
        for v in buffer.iter_mut() {
            if self.channel == 0 && self.frames.map_or(false, |f| self.sample >= f) {
                break;
            }
            *v = self.amplitude * (self.omega * self.sample as f32 / self.samplerate).sin();
            written += 1;

            self.channel += 1;
            if self.channel >= self.channels {
                self.sample += 1;
                self.channel = 0;
            }
        }
        written
    }
}
