mod buffer;
mod config;
mod convert;
mod error;
mod format;
mod pipeline;
pub mod sink;
pub mod source;
pub mod wav;

pub use buffer::{GainAwareBuffer, RingBuffer};
pub use config::Config;
pub use convert::StreamConverter;
pub use error::{ConvertError, FormatError, SinkError, WavError};
pub use format::{AudioFormat, Encoding};
pub use pipeline::Pipeline;
pub use sink::{
    Clock, HttpSink, Output, PacedWriter, PipeSink, Sink, SinkState, SystemClock, UdpSink,
};
pub use source::{Sine, Source};
