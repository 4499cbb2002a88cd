mod sine;

pub use sine::Sine;

/// Producer of interleaved `f32` samples in [-1.0, 1.0].
pub trait Source {
    fn samplerate(&self) -> f32;
    fn channels(&self) -> u16;

    /// Fill `buffer` and return how many samples were written. Zero means
    /// the source is exhausted.
    fn fill(&mut self, buffer: &mut [f32]) -> usize;
}

impl<S> Source for &mut S
where
    S: Source + ?Sized,
{
    fn samplerate(&self) -> f32 {
        (**self).samplerate()
    }

    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn fill(&mut self, buffer: &mut [f32]) -> usize {
        (**self).fill(buffer)
    }
}
