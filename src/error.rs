//! Error types.
//!
//! Configuration problems (bad formats, unsupported conversions, a sink that
//! cannot bind) are returned as errors and are not retryable. Transient I/O
//! trouble while streaming never shows up here: sinks absorb it and log it.

use std::net::SocketAddr;

/// An [`AudioFormat`](crate::AudioFormat) that cannot describe real PCM.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("sample rate must be nonzero")]
    ZeroSampleRate,
    #[error("channel count must be nonzero")]
    ZeroChannels,
    #[error("unsupported sample size: {0} bits (expected 8 or 16)")]
    UnsupportedBits(u16),
}

/// A conversion the [`StreamConverter`](crate::StreamConverter) cannot perform.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("cannot convert from '{from}' to '{to}'")]
    Incompatible { from: String, to: String },
    #[error("unsupported channel conversion: {from} to {to}")]
    Channels { from: u16, to: u16 },
}

/// Failure while writing a WAV header.
#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("invalid header argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Setup failures for a [`Sink`](crate::Sink).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Wav(#[from] WavError),
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("sink is closed")]
    Closed,
}
