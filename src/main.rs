//! Speedcam Sentinel CLI
//!
//! Speed camera proximity alerts from a position stream.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::Sender;
use speedcam_sentinel::{
    agent::{Agent, ControlCommand},
    capability::{
        AlertDispatcher, AlertSound, CommandSound, InhibitWakeLock, SilentSound, TerminalBell,
        UnsupportedWakeLock, WakeLockProvider,
    },
    catalog,
    config::Config,
    core::{assess, evaluate, AlertState},
    position::{PositionSample, PositionSource, ReplaySource},
    session::{TrackingSession, Visibility},
    stats::{create_shared_stats_with_persistence, SessionStats},
    Catalog, NOTICE, VERSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speedcam")]
#[command(version = VERSION)]
#[command(about = "Speed camera proximity alerts", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track positions and raise alerts
    Run(RunArgs),

    /// Pause tracking in a running agent
    Pause,

    /// Resume tracking in a running agent
    Resume,

    /// Show configuration and cumulative statistics
    Status,

    /// Show configuration
    Config,

    /// List and validate the camera catalog
    Catalog {
        /// Catalog file or URL (defaults to the configured one)
        #[arg(long)]
        catalog: Option<String>,
    },

    /// Evaluate a single position against the catalog
    Probe {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Direction of travel in degrees
        #[arg(long, allow_hyphen_values = true)]
        heading: Option<f64>,

        /// Catalog file or URL (defaults to the configured one)
        #[arg(long)]
        catalog: Option<String>,
    },

    /// Display the driver notice
    Notice,
}

#[derive(Args)]
struct RunArgs {
    /// Replay positions from a JSON-lines file instead of reading stdin
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Catalog file or URL (defaults to the configured one)
    #[arg(long)]
    catalog: Option<String>,

    /// Milliseconds between replayed samples
    #[arg(long)]
    interval_ms: Option<u64>,

    /// No alert sound
    #[arg(long)]
    mute: bool,

    /// Do not keep the display awake
    #[arg(long)]
    no_wake_lock: bool,

    /// Serve the control API on this local port (requires server feature)
    #[cfg(feature = "server")]
    #[arg(long)]
    control_port: Option<u16>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Pause => cmd_pause(),
        Commands::Resume => cmd_resume(),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
        Commands::Catalog { catalog } => cmd_catalog(catalog),
        Commands::Probe {
            lat,
            lon,
            heading,
            catalog,
        } => cmd_probe(lat, lon, heading, catalog),
        Commands::Notice => {
            println!("{NOTICE}");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("speedcam_sentinel=debug,speedcam=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("speedcam_sentinel=info,speedcam=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    println!("Speedcam Sentinel v{VERSION}");
    println!();

    let config = Config::load().context("loading configuration")?;
    config.ensure_directories()?;

    let location = args.catalog.unwrap_or_else(|| config.catalog.clone());
    let cameras = Arc::new(
        catalog::load(&location).with_context(|| format!("loading catalog {location}"))?,
    );
    println!("Loaded {} camera(s) from {location}", cameras.len());

    let interval = args
        .interval_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| config.replay_interval());
    let keys_enabled = args.replay.is_some();
    let source: Box<dyn PositionSource> = match &args.replay {
        Some(path) => Box::new(ReplaySource::file(path, interval)),
        None => Box::new(ReplaySource::stdin()),
    };

    let wake_lock: Box<dyn WakeLockProvider> = match InhibitWakeLock::system() {
        Some(inhibitor) if config.wake_lock && !args.no_wake_lock => Box::new(inhibitor),
        _ => Box::new(UnsupportedWakeLock),
    };

    let sound: Box<dyn AlertSound> = if args.mute {
        Box::new(SilentSound::new())
    } else {
        match config
            .alert
            .sound_command
            .as_deref()
            .and_then(CommandSound::from_argv)
        {
            Some(command) => Box::new(command),
            None => Box::new(TerminalBell::stderr()),
        }
    };
    let dispatcher = AlertDispatcher::new(sound).with_pattern(&config.alert.vibration_pattern_ms);

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let session = TrackingSession::new(cameras, source)
        .with_thresholds(config.thresholds())
        .with_wake_lock(wake_lock)
        .with_dispatcher(dispatcher)
        .with_stats(stats.clone());

    let (commands, receiver) = crossbeam_channel::unbounded();
    let agent = Agent::new(session, receiver)
        .watch_config(Config::config_path(), config.paused)
        .on_alert(|event| {
            println!();
            println!("⚠ {}", event.banner());
            println!("  Press 'd' + Enter to dismiss.");
        });

    ctrlc_handler(agent.running())?;

    #[cfg(feature = "server")]
    let server = match args.control_port {
        Some(port) => Some(start_server(port, commands.clone(), agent.status())?),
        None => None,
    };

    if keys_enabled {
        spawn_key_reader(commands.clone());
        println!("Keys: d dismiss, s stop, r start, h hidden, v visible, q quit (then Enter)");
    }

    if config.paused {
        println!("Tracking is currently paused.");
        println!("Run `speedcam resume` to start tracking.");
    } else {
        let _ = commands.send(ControlCommand::Start);
    }
    println!("Press Ctrl+C to stop.");
    println!();

    agent.run();

    #[cfg(feature = "server")]
    if let Some((runtime, shutdown)) = server {
        let _ = shutdown.send(());
        runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    }

    if let Err(e) = stats.save() {
        tracing::warn!(error = %e, "could not save statistics");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

#[cfg(feature = "server")]
fn start_server(
    port: u16,
    commands: Sender<ControlCommand>,
    status: speedcam_sentinel::SharedStatus,
) -> anyhow::Result<(tokio::runtime::Runtime, tokio::sync::oneshot::Sender<()>)> {
    use speedcam_sentinel::server::{run, ServerConfig};

    let runtime = tokio::runtime::Runtime::new()?;
    let (addr, shutdown) = runtime.block_on(run(ServerConfig::new(port), commands, status))?;
    println!("Control API: http://{addr}");
    Ok((runtime, shutdown))
}

/// Map terminal lines to control commands.
fn spawn_key_reader(commands: Sender<ControlCommand>) {
    let spawned = thread::Builder::new()
        .name("control-keys".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                let command = match line.trim() {
                    "d" => ControlCommand::Dismiss,
                    "s" => ControlCommand::Stop,
                    "r" => ControlCommand::Start,
                    "h" => ControlCommand::Visibility(Visibility::Hidden),
                    "v" => ControlCommand::Visibility(Visibility::Visible),
                    "q" => ControlCommand::Shutdown,
                    "" => continue,
                    other => {
                        eprintln!("Unknown key '{other}'");
                        continue;
                    }
                };
                if commands.send(command).is_err() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "control keys unavailable");
    }
}

fn cmd_pause() -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    config.paused = true;
    config.save().context("saving configuration")?;
    println!("Tracking paused. Use 'speedcam resume' to continue.");
    Ok(())
}

fn cmd_resume() -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    config.paused = false;
    config.save().context("saving configuration")?;
    println!("Tracking resumed.");
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Speedcam Sentinel Status");
    println!("========================");
    println!();

    println!("Configuration:");
    println!("  Catalog: {}", config.catalog);
    println!("  Alert radius: {} m", config.alert.radius_meters);
    println!(
        "  Heading tolerance: {}°",
        config.alert.angle_tolerance_degrees
    );
    println!(
        "  Wake lock: {}",
        if config.wake_lock {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Paused: {}", config.paused);
    println!();

    let stats_path = config.stats_path();
    if !stats_path.exists() {
        println!("No previous session data found.");
        return Ok(());
    }

    let stats = SessionStats::read(&stats_path)
        .with_context(|| format!("reading {}", stats_path.display()))?;
    println!("Cumulative Statistics:");
    println!("  Position samples: {}", stats.samples_processed);
    println!("  Source errors: {}", stats.source_errors);
    println!("  Alerts raised: {}", stats.alerts_raised);
    println!("  Alerts dismissed: {}", stats.alerts_dismissed);
    println!("  Sessions started: {}", stats.sessions_started);
    println!(
        "  Wake locks: {} acquired, {} failed",
        stats.wake_locks_acquired, stats.wake_lock_failures
    );
    println!("  Last updated: {}", stats.last_updated);
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn load_catalog(location: Option<String>) -> anyhow::Result<Catalog> {
    let location = match location {
        Some(location) => location,
        None => Config::load().context("loading configuration")?.catalog,
    };
    catalog::load(&location).with_context(|| format!("loading catalog {location}"))
}

fn cmd_catalog(location: Option<String>) -> anyhow::Result<()> {
    let cameras = load_catalog(location)?;

    println!("{:>6}  {:<32} {:>6} {:>11} {:>11}", "ID", "NAME", "LIMIT", "LAT", "LON");
    for point in cameras.points() {
        println!(
            "{:>6}  {:<32} {:>6} {:>11.6} {:>11.6}",
            point.id, point.name, point.speed_limit, point.latitude, point.longitude
        );
    }
    println!();
    println!("{} camera(s), catalog is valid.", cameras.len());
    Ok(())
}

fn cmd_probe(
    lat: f64,
    lon: f64,
    heading: Option<f64>,
    location: Option<String>,
) -> anyhow::Result<()> {
    let cameras = load_catalog(location)?;
    let thresholds = Config::load().unwrap_or_default().thresholds();
    let sample = PositionSample::new(lat, lon, heading);

    println!(
        "{:>6}  {:<32} {:>10} {:>8} {:>8}  {}",
        "ID", "NAME", "DIST (m)", "BEARING", "Δ HEAD", "MATCH"
    );
    for point in cameras.points() {
        let assessment = assess(&sample, point, &thresholds);
        println!(
            "{:>6}  {:<32} {:>10.1} {:>8.1} {:>8}  {}",
            point.id,
            point.name,
            assessment.distance_meters,
            assessment.bearing_degrees,
            assessment
                .angle_difference
                .map(|d| format!("{d:.1}"))
                .unwrap_or_else(|| "-".to_string()),
            if assessment.qualifies() { "yes" } else { "no" }
        );
    }
    println!();

    match evaluate(&sample, &cameras, &AlertState::none(), &thresholds).triggered {
        Some(event) => println!("Alert: {}", event.banner()),
        None => println!("No alert."),
    }
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
