use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use morphr_core::{
    AppConfig, ManualHost, MorphConfig, MorphError, MorphScheduler, Observer, Progress, ProgressRecorder,
    RefreshLoop, TimingRegistry,
};
use tracing_subscriber::EnvFilter;

const BAR_WIDTH: usize = 40;

fn main() -> morphr_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Curves => list_curves(),
        Commands::Sample { curve, steps, json } => sample_curve(&curve, steps, json),
        Commands::Run(args) => run_live(&args),
        Commands::Simulate {
            run,
            frame_ms,
            json,
        } => run_simulated(&run, frame_ms, json),
    }
}

fn list_curves() -> morphr_core::Result<()> {
    let registry = TimingRegistry::builtin();
    for name in registry.names() {
        println!("{name}");
    }
    Ok(())
}

fn sample_curve(name: &str, steps: usize, json: bool) -> morphr_core::Result<()> {
    let registry = TimingRegistry::builtin();
    let curve = registry
        .get(name)
        .ok_or_else(|| MorphError::msg(format!("unknown timing function `{name}`")))?;
    let samples = curve.sample(steps);

    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
    } else {
        for sample in samples {
            println!("{:>6.3} {}", sample.ratio, bar(sample.value));
        }
    }
    Ok(())
}

fn run_live(args: &RunArgs) -> morphr_core::Result<()> {
    let config = args.resolve()?;
    let limit = run_limit(&config.morph)?;
    tracing::info!(?config, "starting live run");

    let host = RefreshLoop::new(config.host.refresh_hz)?;
    let scheduler = MorphScheduler::from_config(&config.morph, &TimingRegistry::builtin())?
        .with_host(host.clone());
    scheduler.register(Observer::new(|progress| match progress {
        Progress::Reset => tracing::info!("run reset"),
        Progress::At(value) => println!("{}", bar(value)),
    }));
    scheduler.start()?;

    let frames = host.run(Some(limit));
    tracing::info!(frames, last = ?scheduler.last_progress(), "live run complete");
    Ok(())
}

fn run_simulated(args: &RunArgs, frame_ms: f64, json: bool) -> morphr_core::Result<()> {
    if !(frame_ms.is_finite() && frame_ms > 0.0) {
        return Err(MorphError::msg(format!(
            "frame interval must be a positive number of milliseconds, got {frame_ms}"
        )));
    }

    let config = args.resolve()?;
    let window_ms = (config.morph.start_delay + config.morph.duration) * 1000.0;
    let max_frames = frame_budget(window_ms, frame_ms)?;
    tracing::info!(?config, frame_ms, "running simulation");

    let host = ManualHost::new();
    let recorder = ProgressRecorder::new();
    let scheduler = MorphScheduler::from_config(&config.morph, &TimingRegistry::builtin())?
        .with_host(host.clone());
    scheduler.register(recorder.observer()).start()?;

    let frames = host.run_frames(0.0, frame_ms, max_frames)?;

    if json {
        println!("{}", recorder.to_json()?);
    } else {
        for value in recorder.values() {
            println!("{}", bar(value));
        }
    }
    tracing::info!(frames, dispatched = recorder.values().len(), "simulation complete");
    Ok(())
}

/// Wall-clock budget for a live run, with headroom for frames that land past
/// the window.
fn run_limit(morph: &MorphConfig) -> morphr_core::Result<Duration> {
    let secs = morph.start_delay + morph.duration + 1.0;
    Duration::try_from_secs_f64(secs).map_err(|err| {
        MorphError::msg(format!("run window of {secs} s is not representable: {err}"))
    })
}

/// Frames needed to cover `window_ms`, plus the frame that closes the window
/// and the first one that anchors it.
fn frame_budget(window_ms: f64, frame_ms: f64) -> morphr_core::Result<usize> {
    let frames = (window_ms / frame_ms).ceil();
    if !(frames.is_finite() && frames >= 0.0 && frames < usize::MAX as f64) {
        return Err(MorphError::msg(format!(
            "a {window_ms} ms window at {frame_ms} ms per frame needs too many frames to simulate"
        )));
    }
    Ok((frames as usize).saturating_add(2))
}

fn bar(value: f64) -> String {
    let filled = (value.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "{value:>8.4} |{}{}|",
        "#".repeat(filled),
        " ".repeat(BAR_WIDTH - filled)
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Frame-driven value morphing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the built-in timing functions.
    Curves,
    /// Tabulate a timing function over [0, 1].
    Sample {
        /// Name of the timing function.
        curve: String,
        /// Number of intervals between 0 and 1.
        #[arg(short, long, default_value_t = 10)]
        steps: usize,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Drive a morph run in real time at the configured refresh rate.
    Run(RunArgs),
    /// Drive a morph run against a simulated clock and print every dispatch.
    Simulate {
        #[command(flatten)]
        run: RunArgs,
        /// Simulated frame interval in milliseconds.
        #[arg(long, default_value_t = 1000.0 / 60.0)]
        frame_ms: f64,
        /// Emit the recorded progress as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON configuration file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Morph duration in seconds.
    #[arg(long)]
    duration: Option<f64>,
    /// Start delay in seconds.
    #[arg(long)]
    delay: Option<f64>,
    /// Timing function name.
    #[arg(long)]
    curve: Option<String>,
    /// Refresh rate of the real-time host.
    #[arg(long)]
    fps: Option<u32>,
    /// Clamp the final frame to exactly the end of the curve.
    #[arg(long)]
    clamp: bool,
}

impl RunArgs {
    fn resolve(&self) -> morphr_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(duration) = self.duration {
            config.morph.duration = duration;
        }
        if let Some(delay) = self.delay {
            config.morph.start_delay = delay;
        }
        if let Some(curve) = &self.curve {
            config.morph.timing = curve.clone();
        }
        if let Some(fps) = self.fps {
            config.host.refresh_hz = fps;
        }
        if self.clamp {
            config.morph.clamp_ratio = true;
        }
        Ok(config)
    }
}
