use anyhow::{Context, Result};
use clap::Parser;
use intruder_watch::{ExitCategory, SchedulerMode, WatchApp, WatchConfig, WatchError};
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "intruder-watch")]
#[command(about = "Multi-stream intruder detection with debounced event confirmation")]
#[command(version)]
#[command(long_about = "Scans several video sources in lock-step real time, runs an object \
detector over the frames and records an event whenever the number of tracked objects in a \
source rises and stays risen. Events are written to JSON logs and snapshots, and can be \
forwarded to a webhook.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "intruder-watch.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without opening any source")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override the scheduler mode
    #[arg(long, value_name = "MODE", help = "Submission mode: async or sync")]
    mode: Option<SchedulerMode>,

    /// Rewind finite sources when they end
    #[arg(long, help = "Loop video files and image sequences instead of ending")]
    loop_video: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.print_config {
        if let Err(e) = print_default_config() {
            eprintln!("Failed to print default configuration: {:#}", e);
            std::process::exit(ExitCategory::Runtime.exit_code());
        }
        return;
    }

    let loaded = WatchConfig::load_from_file(&args.config);
    let intruder_log = loaded
        .as_ref()
        .map(|config| config.output.intruder_log.clone())
        .unwrap_or_else(|_| WatchConfig::default().output.intruder_log);

    let _guard = match init_logging(&args, &intruder_log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            std::process::exit(ExitCategory::Runtime.exit_code());
        }
    };

    info!("Starting intruder watch v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let code = match loaded.map_err(WatchError::from) {
        Ok(config) => match run(&args, config).await {
            Ok(()) => ExitCategory::Success.exit_code(),
            Err(e) => {
                let category = e
                    .downcast_ref::<WatchError>()
                    .map(WatchError::category)
                    .unwrap_or(ExitCategory::Runtime);
                error!("Intruder watch failed: {:#}", e);
                eprintln!("✗ {:#}", e);
                category.exit_code()
            }
        },
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("✗ Failed to load configuration: {}", e);
            e.category().exit_code()
        }
    };

    if code != 0 {
        // Flush the intruder log before exiting
        drop(_guard);
        std::process::exit(code);
    }
}

async fn run(args: &Args, mut config: WatchConfig) -> Result<()> {
    if let Some(mode) = args.mode {
        info!("Scheduler mode overridden to {}", mode.as_str());
        config.scheduler.mode = mode;
    }
    if args.loop_video {
        config.scheduler.loop_video = true;
    }

    if args.validate_config {
        config.validate().map_err(WatchError::from)?;
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let app = WatchApp::build(config)?;
    let outcome = app.run().await?;

    println!(
        "Stopped ({}): {} ticks, {} events",
        outcome.reason, outcome.summary.ticks, outcome.summary.events
    );
    Ok(())
}

fn init_logging(args: &Args, intruder_log: &str) -> Result<WorkerGuard> {
    use tracing_subscriber::{
        filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("intruder_watch={},intruder=info", log_level))
    });

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    // Confirmed events also go to the intruder log, one plain line each
    let path = Path::new(intruder_log);
    let directory = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("intruder log path '{}' has no file name", intruder_log))?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create {}", directory.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
    let intruder_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_level(false)
        .without_time()
        .with_filter(Targets::new().with_target("intruder", tracing::Level::INFO));

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .with(intruder_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Intruder watch configuration file");
    println!("# Default values for every option; add [[sources]] entries to scan video");
    println!();

    let rendered = toml::to_string_pretty(&WatchConfig::default()).map_err(WatchError::from)?;
    println!("{}", rendered);
    Ok(())
}
