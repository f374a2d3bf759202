//! Cadence Player - play one sound file through the cadence engine
//!
//! Streams the file on channel 0, prints the position once a second and
//! exits when playback ends.
//!
//! ## Command line flags
//!
//! - `--loop N`: repeat N more times (negative loops forever)
//! - `--volume V`: gain in [0, 1]
//! - `--pitch P`: playback rate multiplier
//! - `--reverb PRESET`: route through a reverb preset (see `--list-presets`)
//! - `--headless`: run on the real-time clock instead of an audio device
//! - `--config PATH`: engine config YAML (default: `~/.config/cadence/engine.yaml`)
//! - `--list-devices`, `--list-presets`: print and exit

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use crossbeam::channel::RecvTimeoutError;

use cadence_core::config::{default_config_path, load_config, BackendKind, EngineConfig};
use cadence_core::device::get_output_devices;
use cadence_core::effect::ReverbPreset;
use cadence_core::events::ChannelEvent;
use cadence_core::system::AudioSystem;
use cadence_core::{ChannelState, PlaybackState};

const CHANNEL: i32 = 0;
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
struct Args {
    file: Option<PathBuf>,
    loop_count: i32,
    volume: f32,
    pitch: f32,
    reverb: Option<ReverbPreset>,
    headless: bool,
    list_devices: bool,
    list_presets: bool,
    config: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            file: None,
            loop_count: 0,
            volume: 1.0,
            pitch: 1.0,
            reverb: None,
            headless: false,
            list_devices: false,
            list_presets: false,
            config: None,
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{} needs a value", flag));
        match arg.as_str() {
            "--loop" => {
                parsed.loop_count = value("--loop")?.parse().context("--loop expects an integer")?
            }
            "--volume" => {
                parsed.volume = value("--volume")?.parse().context("--volume expects a number")?
            }
            "--pitch" => {
                parsed.pitch = value("--pitch")?.parse().context("--pitch expects a number")?
            }
            "--reverb" => {
                let name = value("--reverb")?;
                let preset = ReverbPreset::from_name(&name)
                    .ok_or_else(|| anyhow!("unknown reverb preset '{}' (try --list-presets)", name))?;
                parsed.reverb = Some(preset);
            }
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--headless" => parsed.headless = true,
            "--list-devices" => parsed.list_devices = true,
            "--list-presets" => parsed.list_presets = true,
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            file => {
                if parsed.file.is_some() {
                    bail!("only one file can be played");
                }
                parsed.file = Some(PathBuf::from(file));
            }
        }
    }
    Ok(parsed)
}

fn format_ms(ms: u64) -> String {
    format!("{}:{:02}.{:03}", ms / 60_000, (ms / 1000) % 60, ms % 1000)
}

fn list_devices() -> Result<()> {
    let devices = get_output_devices().context("Failed to enumerate output devices")?;
    for device in devices {
        let rates = device
            .sample_rates
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{}  [{} ch; {} Hz]", device, device.max_channels, rates);
    }
    Ok(())
}

fn list_presets() {
    for preset in ReverbPreset::ALL {
        println!("{:<18} {}", preset.name(), preset.describe());
    }
}

fn run(args: Args) -> Result<()> {
    let Some(file) = args.file else {
        bail!("usage: cadence-player [options] <file>");
    };

    let config_path = args
        .config
        .unwrap_or_else(|| default_config_path("engine.yaml"));
    let mut config: EngineConfig = load_config(&config_path);
    if args.headless {
        config.device.backend = BackendKind::Headless;
    }

    let system = AudioSystem::new(config).context("Failed to open audio system")?;
    let pool = system.pool();
    let events = system.events();
    println!(
        "Output: {} ({} Hz, {:.1} ms latency)",
        system.device().name(),
        system.device().sample_rate(),
        system.device().latency_ms()
    );

    if let Some(preset) = args.reverb {
        let reverb = pool
            .create_reverb(preset)
            .with_context(|| format!("Failed to create '{}' reverb", preset))?;
        pool.attach(CHANNEL, reverb).context("Failed to attach reverb")?;
        println!("Reverb: {}", preset.describe());
    }

    pool.play(CHANNEL, &file, args.volume, args.pitch, args.loop_count)
        .with_context(|| format!("Failed to play {}", file.display()))?;

    let title = pool.info(CHANNEL, "title").unwrap_or_default();
    println!(
        "Playing {}{} [{:?}/{:?}, {} Hz, {} ch, {}]",
        file.display(),
        if title.is_empty() { String::new() } else { format!(" \"{}\"", title) },
        pool.format(CHANNEL).unwrap_or_default(),
        pool.encoding(CHANNEL).unwrap_or_default(),
        pool.sample_rate(CHANNEL).unwrap_or_default(),
        pool.channel_count(CHANNEL).unwrap_or_default(),
        format_ms(pool.duration(CHANNEL).unwrap_or_default()),
    );

    let mut next_report = Instant::now() + REPORT_INTERVAL;
    loop {
        let timeout = next_report.saturating_duration_since(Instant::now());
        match events.recv_timeout(timeout) {
            Ok(ChannelEvent::Started { channel }) => println!("channel {}: started", channel),
            Ok(ChannelEvent::Completed { channel }) => println!("channel {}: complete", channel),
            Err(RecvTimeoutError::Timeout) => {
                next_report += REPORT_INTERVAL;
                println!(
                    "  {} / {}  (loops left: {})",
                    format_ms(pool.position(CHANNEL).unwrap_or_default()),
                    format_ms(pool.duration(CHANNEL).unwrap_or_default()),
                    pool.loop_count(CHANNEL).unwrap_or_default()
                );
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let idle = pool.channel_state(CHANNEL)? == ChannelState::Idle;
        let state = pool.playback_state(CHANNEL).unwrap_or_default();
        if idle && state != PlaybackState::Paused {
            break;
        }
    }

    pool.stop(CHANNEL)?;
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    log::info!("cadence-player starting up");

    if args.list_presets {
        list_presets();
        return Ok(());
    }
    if args.list_devices {
        return list_devices();
    }
    run(args)
}
