use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::buffer::GainAwareBuffer;
use crate::convert::StreamConverter;
use crate::error::SinkError;
use crate::format::AudioFormat;
use crate::sink::{Sink, SinkState};
use crate::source::Source;

/// Moves 16-bit PCM from a producer to one sink.
///
/// The producer writes into a [`GainAwareBuffer`] (blocking when it is
/// full). A consumer thread reads blocks with the current volume applied,
/// converts them to the sink's layout if needed, and hands them to the sink.
pub struct Pipeline {
    buffer: Arc<GainAwareBuffer>,
    sink: Arc<dyn Sink>,
    volume: Arc<AtomicU32>,
    source_format: AudioFormat,
    sink_format: AudioFormat,
    block: usize,
    consumer: Option<JoinHandle<()>>,
}

impl Pipeline {
    pub fn new(
        sink: Box<dyn Sink>,
        source_format: AudioFormat,
        sink_format: AudioFormat,
        capacity: usize,
    ) -> anyhow::Result<Self> {
        if source_format.bits_per_sample() != 16 {
            anyhow::bail!("pipeline source must be 16 bit, got {}", source_format);
        }
        let converter = if source_format.matches(&sink_format) {
            None
        } else {
            Some(StreamConverter::new(source_format, sink_format)?)
        };

        // 20ms of audio per block
        let frames = (source_format.sample_rate() as usize / 50).max(1);
        let block = frames * source_format.frame_size();

        let buffer = Arc::new(GainAwareBuffer::new(
            capacity.max(source_format.frame_size()),
            source_format.is_big_endian(),
        ));
        let sink: Arc<dyn Sink> = Arc::from(sink);
        let volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));

        sink.start(&sink_format)?;

        let consumer = {
            let buffer = buffer.clone();
            let sink = sink.clone();
            let volume = volume.clone();
            std::thread::Builder::new()
                .name("pcmcast-sink".to_owned())
                .spawn(move || consume(buffer, sink, volume, converter, block))?
        };

        Ok(Pipeline {
            buffer,
            sink,
            volume,
            source_format,
            sink_format,
            block,
            consumer: Some(consumer),
        })
    }

    pub fn source_format(&self) -> &AudioFormat {
        &self.source_format
    }

    pub fn sink_format(&self) -> &AudioFormat {
        &self.sink_format
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Set the playback gain, clamped to [0.0, 1.0].
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_nan() {
            0.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Queue raw PCM in the source format. Blocks while the buffer is full;
    /// returns `false` once the pipeline is closed.
    pub fn write_pcm(&self, bytes: &[u8]) -> bool {
        self.buffer.write(bytes)
    }

    /// Feed `source` until it runs dry or the pipeline closes.
    pub fn play<S>(&self, mut source: S) -> anyhow::Result<()>
    where
        S: Source,
    {
        if source.channels() != self.source_format.channels()
            || source.samplerate() as u32 != self.source_format.sample_rate()
        {
            anyhow::bail!(
                "source ({} Hz, {} channels) does not match {}",
                source.samplerate(),
                source.channels(),
                self.source_format
            );
        }

        let big_endian = self.source_format.is_big_endian();
        let mut samples = vec![0.0f32; self.block / 2];
        let mut bytes = Vec::with_capacity(self.block);
        loop {
            let amt = source.fill(&mut samples);
            if amt == 0 {
                break;
            }
            bytes.clear();
            for &v in &samples[..amt] {
                let s = (v.clamp(-1.0, 1.0) * 32767.0) as i16;
                if big_endian {
                    bytes.extend_from_slice(&s.to_be_bytes());
                } else {
                    bytes.extend_from_slice(&s.to_le_bytes());
                }
            }
            if !self.buffer.write(&bytes) {
                break;
            }
        }
        Ok(())
    }

    /// Pad the queued audio to a whole block with silence and wait for the
    /// sink thread to take all of it.
    pub fn finish(&self) {
        let partial = self.buffer.len() % self.block;
        if partial != 0 {
            self.buffer.write(&vec![0; self.block - partial]);
        }
        self.buffer.wait_below(0);
        self.sink.drain();
    }

    /// Pause the sink. Audio reaching it meanwhile is dropped.
    pub fn pause(&self) {
        self.sink.stop();
    }

    /// Start a new logical stream on the sink.
    pub fn resume(&self) -> Result<(), SinkError> {
        self.sink.start(&self.sink_format)
    }

    /// Flush discards queued audio and pushes out what the sink buffers.
    pub fn flush(&self) {
        self.buffer.clear();
        self.sink.drain();
    }

    pub fn sink_state(&self) -> SinkState {
        self.sink.state()
    }

    pub fn close(&mut self) {
        self.buffer.close();
        self.sink.close();
        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                warn!("sink thread panicked");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close();
    }
}

fn consume(
    buffer: Arc<GainAwareBuffer>,
    sink: Arc<dyn Sink>,
    volume: Arc<AtomicU32>,
    mut converter: Option<StreamConverter>,
    block: usize,
) {
    let mut data = vec![0; block];
    loop {
        let gain = f32::from_bits(volume.load(Ordering::Relaxed));
        if !buffer.read_gain(&mut data, gain) {
            break;
        }
        let out = match converter.as_mut() {
            Some(converter) => converter.convert(&data),
            None => &data[..],
        };
        if let Err(e) = sink.write(out) {
            warn!("sink write failed: {}", e);
        }
    }
    debug!("sink thread finished");
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::source::Sine;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Memory {
        data: Mutex<Vec<u8>>,
        state: Mutex<Option<SinkState>>,
        drains: Mutex<usize>,
    }

    impl Sink for Arc<Memory> {
        fn start(&self, _format: &AudioFormat) -> Result<(), SinkError> {
            *self.state.lock().unwrap() = Some(SinkState::Started);
            Ok(())
        }

        fn write(&self, buffer: &[u8]) -> std::io::Result<()> {
            self.data.lock().unwrap().extend_from_slice(buffer);
            Ok(())
        }

        fn stop(&self) {
            *self.state.lock().unwrap() = Some(SinkState::Paused);
        }

        fn drain(&self) {
            *self.drains.lock().unwrap() += 1;
        }

        fn close(&self) {
            *self.state.lock().unwrap() = Some(SinkState::Closed);
        }

        fn state(&self) -> SinkState {
            self.state.lock().unwrap().unwrap_or(SinkState::Uninitialized)
        }
    }

    fn wait_for(memory: &Memory, len: usize) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let data = memory.data.lock().unwrap().clone();
            if data.len() >= len || Instant::now() > deadline {
                return data;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn mono() -> AudioFormat {
        AudioFormat::new(8000, 16, 1, false).unwrap()
    }

    fn le16(samples: impl Iterator<Item = i16>) -> Vec<u8> {
        samples.flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn converts_to_sink_layout() {
        let memory = Arc::new(Memory::default());
        let stereo = AudioFormat::new(8000, 16, 2, false).unwrap();
        let mut pipeline = Pipeline::new(Box::new(memory.clone()), mono(), stereo, 4096).unwrap();
        assert_eq!(pipeline.sink_state(), SinkState::Started);

        // one 20ms block of 160 samples
        assert!(pipeline.write_pcm(&le16(0..160)));
        let data = wait_for(&memory, 640);
        assert_eq!(data, le16((0..160).flat_map(|s| [s, s])));

        pipeline.close();
        assert_eq!(memory.state(), SinkState::Closed);
        assert!(!pipeline.write_pcm(&[0, 0]));
    }

    #[test]
    fn applies_volume() {
        let memory = Arc::new(Memory::default());
        let pipeline = Pipeline::new(Box::new(memory.clone()), mono(), mono(), 4096).unwrap();
        pipeline.set_volume(0.5);
        pipeline.write_pcm(&le16((0..160).map(|s| s * 100)));
        let data = wait_for(&memory, 320);
        assert_eq!(data, le16((0..160).map(|s| s * 50)));

        pipeline.set_volume(3.0);
        assert_eq!(pipeline.volume(), 1.0);
    }

    #[test]
    fn plays_matching_sources_only() {
        let memory = Arc::new(Memory::default());
        let pipeline = Pipeline::new(Box::new(memory.clone()), mono(), mono(), 4096).unwrap();
        assert!(pipeline.play(Sine::new(8000.0, 2, 440.0)).is_err());

        pipeline.play(Sine::new(8000.0, 1, 440.0).seconds(0.04)).unwrap();
        let data = wait_for(&memory, 640);
        assert_eq!(data.len(), 640);

        // half a block gets padded out with silence
        pipeline.write_pcm(&le16(std::iter::repeat(7).take(80)));
        pipeline.finish();
        let data = wait_for(&memory, 960);
        assert_eq!(data.len(), 960);
        assert_eq!(&data[640..800], &le16(std::iter::repeat(7).take(80))[..]);
        assert!(data[800..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_8bit_sources() {
        let memory = Arc::new(Memory::default());
        let narrow = AudioFormat::new(8000, 8, 1, false).unwrap();
        assert!(Pipeline::new(Box::new(memory), narrow, narrow, 4096).is_err());
    }

    #[test]
    fn close_releases_idle_consumer() {
        let memory = Arc::new(Memory::default());
        let mut pipeline = Pipeline::new(Box::new(memory.clone()), mono(), mono(), 4096).unwrap();
        let start = Instant::now();
        pipeline.close();
        assert!(start.elapsed() < Duration::from_secs(1));
        pipeline.pause();
        assert_eq!(memory.state(), SinkState::Paused);
    }

    #[test]
    fn pause_then_resume() {
        let memory = Arc::new(Memory::default());
        let pipeline = Pipeline::new(Box::new(memory.clone()), mono(), mono(), 4096).unwrap();
        pipeline.pause();
        assert_eq!(pipeline.sink_state(), SinkState::Paused);
        pipeline.resume().unwrap();
        assert_eq!(pipeline.sink_state(), SinkState::Started);

        pipeline.write_pcm(&le16(0..160));
        assert_eq!(wait_for(&memory, 320), le16(0..160));
    }

    #[test]
    fn flush_discards_queued_audio() {
        let memory = Arc::new(Memory::default());
        let pipeline = Pipeline::new(Box::new(memory.clone()), mono(), mono(), 4096).unwrap();

        // less than a block stays queued until flushed away
        pipeline.write_pcm(&le16(std::iter::repeat(5).take(100)));
        pipeline.flush();
        assert!(pipeline.buffer.is_empty());
        assert_eq!(*memory.drains.lock().unwrap(), 1);

        pipeline.write_pcm(&le16(0..160));
        assert_eq!(wait_for(&memory, 320), le16(0..160));
    }
}
