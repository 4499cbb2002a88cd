mod gain;
mod ring;

pub use gain::GainAwareBuffer;
pub use ring::RingBuffer;
