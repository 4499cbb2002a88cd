use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use strict_yaml_rust::{StrictYaml, StrictYamlLoader};

use crate::format::AudioFormat;
use crate::sink::Output;

/// Startup configuration, usually read from a YAML file.
///
/// ```yaml
/// output: http://127.0.0.1:50001/
/// buffer: 176400
/// volume: 0.8
/// format:
///   rate: 44100
///   bits: 16
///   channels: 2
///   big-endian: false
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub output: Output,
    pub buffer: usize,
    pub volume: f32,
    pub format: AudioFormat,
    pub source_format: AudioFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            output: Output::Http {
                addr: crate::sink::DEFAULT_HTTP_ADDR.into(),
                path: "/".to_owned(),
            },
            // one second of CD audio
            buffer: 176400,
            volume: 1.0,
            format: AudioFormat::cd_quality(),
            source_format: AudioFormat::cd_quality(),
        }
    }
}

impl Config {
    pub fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let mut config = Config::default();
        let datawhole = StrictYamlLoader::load_from_str(contents)?;
        let data = match datawhole.get(0) {
            Some(data) => data,
            None => return Ok(config),
        };
        Self::check_keys(
            data,
            &[
                "output",
                "buffer",
                "volume",
                "udp-delay-ms",
                "format",
                "source-format",
            ],
        )?;

        if let Some(output) = Self::get_str(data, "output")? {
            config.output = output.parse()?;
        }
        if let Some(buffer) = Self::get_parsed::<usize>(data, "buffer")? {
            if buffer == 0 {
                anyhow::bail!("buffer must be nonzero");
            }
            config.buffer = buffer;
        }
        if let Some(volume) = Self::get_parsed::<f32>(data, "volume")? {
            if !(0.0..=1.0).contains(&volume) {
                anyhow::bail!("volume must be within 0.0 and 1.0, got {}", volume);
            }
            config.volume = volume;
        }
        if let Some(ms) = Self::get_parsed::<u64>(data, "udp-delay-ms")? {
            match config.output {
                Output::Udp { ref mut delay, .. } => *delay = Duration::from_millis(ms),
                _ => anyhow::bail!("udp-delay-ms given for a non-udp output"),
            }
        }
        if !data["format"].is_badvalue() {
            config.format = Self::get_format(&data["format"], config.format)?;
        }
        if !data["source-format"].is_badvalue() {
            config.source_format = Self::get_format(&data["source-format"], config.source_format)?;
        }
        Ok(config)
    }

    fn get_format(data: &StrictYaml, default: AudioFormat) -> anyhow::Result<AudioFormat> {
        Self::check_keys(data, &["rate", "bits", "channels", "big-endian"])?;
        let rate = Self::get_parsed(data, "rate")?.unwrap_or(default.sample_rate());
        let bits = Self::get_parsed(data, "bits")?.unwrap_or(default.bits_per_sample());
        let channels = Self::get_parsed(data, "channels")?.unwrap_or(default.channels());
        let big_endian = match Self::get_str(data, "big-endian")? {
            None => default.is_big_endian(),
            Some("true") | Some("yes") => true,
            Some("false") | Some("no") => false,
            Some(other) => anyhow::bail!("bad value for \"big-endian\": {:?}", other),
        };
        Ok(AudioFormat::new(rate, bits, channels, big_endian)?)
    }

    fn get_str<'a>(data: &'a StrictYaml, k: &str) -> anyhow::Result<Option<&'a str>> {
        let v = if data[k].is_badvalue() {
            Some(None)
        } else {
            data[k].as_str().map(Some)
        };
        v.ok_or_else(|| anyhow::anyhow!("bad value for {:?}, expected string", k))
    }

    fn get_parsed<T>(data: &StrictYaml, k: &str) -> anyhow::Result<Option<T>>
    where
        T: FromStr,
    {
        match Self::get_str(data, k)? {
            Some(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| anyhow::anyhow!("bad value for {:?}: {:?}", k, s)),
            None => Ok(None),
        }
    }

    fn check_keys(data: &StrictYaml, keys: &[&str]) -> anyhow::Result<()> {
        let hash = data
            .as_hash()
            .ok_or_else(|| anyhow::anyhow!("expected yaml dictionary"))?;
        for k in hash.keys() {
            if let Some(k) = k.as_str() {
                if !keys.contains(&k) {
                    anyhow::bail!("unknown key {:?}", k);
                }
            } else {
                anyhow::bail!("unknown key {:?}", k);
            }
        }
        Ok(())
    }
}
