use clap::clap_app;
use log::info;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let matches = clap_app!(
        pcmcast =>
            (@setting SubcommandRequiredElseHelp)
            (@subcommand tone =>
             (about: "stream a test tone to an output")
             (@arg CONFIG: -c --config +takes_value "read settings from a yaml file")
             (@arg OUTPUT: -o --output +takes_value "set output (http, udp, http://HOST:PORT/PATH, udp://HOST:PORT, pipe:PATH)")
             (@arg VOLUME: -v --volume +takes_value "playback volume, 0.0 to 1.0")
             (@arg FREQUENCY: --frequency +takes_value "tone frequency in Hz")
             (@arg SECONDS: --seconds +takes_value "stop after this many seconds")
            )
    )
    .get_matches();

    if let Some(matches) = matches.subcommand_matches("tone") {
        let mut config = match matches.value_of("CONFIG") {
            Some(path) => pcmcast::Config::open(path)?,
            None => pcmcast::Config::default(),
        };
        if let Some(output) = matches.value_of("OUTPUT") {
            config.output = output.parse()?;
        }
        if let Some(volume) = matches.value_of("VOLUME") {
            config.volume = volume.parse()?;
        }
        let frequency: f32 = matches
            .value_of("FREQUENCY")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or(440.0);
        let seconds: Option<f32> = matches
            .value_of("SECONDS")
            .map(|s| s.parse())
            .transpose()?;

        let source_format = config.source_format;
        let sink = config.output.to_sink()?;
        let pipeline =
            pcmcast::Pipeline::new(sink, source_format, config.format, config.buffer)?;
        pipeline.set_volume(config.volume);
        info!(
            "playing {} Hz tone: {} to {:?}",
            frequency, source_format, config.output
        );

        let mut tone = pcmcast::Sine::new(
            source_format.sample_rate() as f32,
            source_format.channels(),
            frequency,
        );
        if let Some(seconds) = seconds {
            tone = tone.seconds(seconds);
        }
        pipeline.play(tone)?;
        pipeline.finish();
    }

    Ok(())
}
