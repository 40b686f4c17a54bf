//! Watch a counter (or a recorded transcript) and autosave finished runs.

use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Local;
use clap::Parser;
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commfil::sources::ReplaySource;
use commfil::{
    Autosaver, Config, Connection, DecoderConfig, FinishedRun, ProtocolEvent, RunRecorder,
    SerialSettings,
};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - Commfil v.2 monitor");

#[derive(Debug, Parser)]
#[command(version = env!("CARGO_PKG_VERSION"), about = PKG_DESCRIPTION)]
struct Cli {
    /// Raw serial capture to replay
    #[arg(value_name = "TRANSCRIPT", conflicts_with = "serial")]
    transcript: Option<PathBuf>,
    /// Serial port of a live counter (requires the `serial` feature)
    #[arg(long = "serial", short = 's', value_name = "PORT")]
    serial: Option<String>,
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print the effective configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Replay speed multiplier
    #[arg(long = "speed", default_value_t = 1.0)]
    speed: f64,
    /// Do not write finished runs to disk
    #[arg(long = "no-autosave")]
    no_autosave: bool,
    /// Directory for autosaved runs
    #[arg(long = "autosave-dir", value_name = "DIR")]
    autosave_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if cli.no_autosave {
        config.autosave.enabled = false;
    }
    if let Some(dir) = &cli.autosave_dir {
        config.autosave.directory.clone_from(dir);
    }
    if let Some(port) = &cli.serial {
        let settings = config.serial.get_or_insert_with(|| SerialSettings::new(port.as_str()));
        settings.port.clone_from(port);
    }

    if cli.print_config {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    let mut connection = match (&cli.transcript, &config.serial) {
        (Some(path), _) => {
            let mut source = ReplaySource::open(path).await?;
            source.set_speed(cli.speed);
            Connection::from_source(source, config.decoder.clone())
        }
        (None, Some(settings)) => open_serial(settings, &config.decoder).await?,
        (None, None) => bail!("nothing to monitor: pass a transcript file or --serial PORT"),
    };
    info!("Monitoring {}", connection.description());

    let autosaver = Autosaver::new(config.autosave.clone());
    let mut recorder = RunRecorder::new();
    let Some(mut events) = connection.events() else {
        bail!("event stream already taken");
    };

    let mut closing = false;
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c(), if !closing => {
                info!("Ctrl+C received, shutting down");
                // The decoder settles what it holds before the stream ends
                connection.close();
                closing = true;
                continue;
            }
            event = events.next() => event,
        };
        let Some(event) = event else {
            info!("Input ended");
            break;
        };

        print_event(&event);
        if let Some(run) = recorder.observe(&event) {
            save(&autosaver, &run).await;
        }
    }

    if let Some(run) = recorder.finish() {
        save(&autosaver, &run).await;
    }
    Ok(())
}

#[cfg(feature = "serial")]
async fn open_serial(
    settings: &SerialSettings,
    decoder: &DecoderConfig,
) -> commfil::Result<Connection> {
    let source = commfil::sources::SerialSource::open(settings)?;
    Ok(Connection::from_source(source, decoder.clone()))
}

#[cfg(not(feature = "serial"))]
async fn open_serial(
    settings: &SerialSettings,
    _decoder: &DecoderConfig,
) -> commfil::Result<Connection> {
    Connection::connect_serial(settings).await
}

fn print_event(event: &ProtocolEvent) {
    match event {
        ProtocolEvent::TimeSample(sample) => {
            println!("{:>8} s  {:>10} cpm", sample.elapsed_seconds, sample.count_rate);
        }
        ProtocolEvent::SpectrumComplete(spectrum) => {
            let peak = spectrum
                .peak()
                .map(|(channel, count)| format!("peak {count} in channel {channel}"))
                .unwrap_or_default();
            println!(
                "spectrum: {} channels, {} counts, {}, checksum {}",
                spectrum.channel_count(),
                spectrum.total_counts(),
                peak,
                if spectrum.checksum_ok { "ok" } else { "unverified" }
            );
        }
        ProtocolEvent::RunStarted(header) => {
            let start = header.start_time.map(|t| t.to_string()).unwrap_or_default();
            println!("{} run {} started {} {}", header.kind, header.protocol, header.date, start);
        }
        ProtocolEvent::SampleIdentified { protocol, sample_number } => {
            println!("sample {sample_number} ({protocol})");
        }
        ProtocolEvent::RunReset { previous, discarded } => {
            info!("Dropped {} {} values", discarded, previous);
        }
        ProtocolEvent::DecodeError(error) => warn!("{}", error),
        ProtocolEvent::BufferExhausted { discarded } => {
            warn!("Discarded {} bytes of oversize frame", discarded);
        }
    }
}

async fn save(autosaver: &Autosaver, run: &FinishedRun) {
    match autosaver.save(run, Local::now().naive_local()).await {
        Ok(Some(path)) => println!("saved {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            warn!("Autosave failed: {}", e);
            for suggestion in e.recovery_suggestions() {
                warn!("  - {}", suggestion);
            }
        }
    }
}
