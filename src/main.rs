use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use std::pin::pin;
use std::process;
use std::task::Poll;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use fnirsi_lib::constants::DEFAULT_ALPHA;
use fnirsi_lib::stop::DEFAULT_STOP_FILE;
use fnirsi_lib::{
    AnyStop, Deadline, DeviceSelector, FileStop, InterruptFlag, NusbTransport, OpenOptions, OutputSink, Session,
    SessionConfig, SinkFormat, TracingObserver, find_meter, list_meters,
};

mod logging;

/// Data logger for FNIRSI FNB48 / C1 / FNB58 / FNB48S USB power meters.
#[derive(Parser, Debug)]
#[command(name = "fnirsi", author, version, about, long_about = None)]
struct Cli {
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream measurements until stopped.
    Log(LogArgs),
    /// Inspect connected meters.
    Device {
        #[command(subcommand)]
        action: DeviceCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DeviceCommand {
    /// List connected supported meters.
    List {
        /// Print the listing as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
struct LogArgs {
    /// Drop frames whose CRC does not match.
    #[arg(long)]
    crc: bool,
    /// Temperature smoothing factor, between 0 and 1.
    #[arg(long, default_value_t = DEFAULT_ALPHA, value_parser = parse_alpha)]
    alpha: f64,
    /// Output file, `-` for stdout.
    #[arg(short, long, default_value = "-")]
    output: PathBuf,
    /// Output format: stream or csv.
    #[arg(short, long, default_value_t = SinkFormat::Stream)]
    format: SinkFormat,
    /// Serial number of the meter (hex).
    #[arg(short, long, conflicts_with = "device")]
    serial: Option<String>,
    /// Meter to open as VID:PID (hex).
    #[arg(short, long)]
    device: Option<String>,
    /// Stop once this file exists.
    #[arg(long, default_value = DEFAULT_STOP_FILE)]
    stop_file: PathBuf,
    /// Stop after this many seconds.
    #[arg(short = 't', long, value_parser = parse_seconds)]
    duration: Option<Duration>,
    /// Skip the USB reset before claiming the interface.
    #[arg(long)]
    no_reset: bool,
}

fn parse_alpha(s: &str) -> Result<f64, String> {
    let alpha: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if alpha > 0.0 && alpha < 1.0 {
        Ok(alpha)
    } else {
        Err(format!("alpha must be between 0 and 1 (exclusive), got {alpha}"))
    }
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let guard = logging::init(cli.log_file.as_deref(), &cli.verbose)?;

    let result = match cli.command {
        Command::Log(args) => run_log(args),
        Command::Device {
            action: DeviceCommand::List { json },
        } => list(json),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        drop(guard);
        process::exit(1);
    }

    Ok(())
}

fn list(json: bool) -> Result<()> {
    let listings: Vec<_> = list_meters()
        .context("Failed to enumerate USB devices")?
        .iter()
        .map(|m| m.listing())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
    } else if listings.is_empty() {
        info!("No supported meters found.");
    } else {
        for listing in &listings {
            println!("{listing}");
        }
    }
    Ok(())
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("fnirsi-io")
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Raise the returned flag on Ctrl+C.
///
/// Returns once the handler is installed, so an early Ctrl+C cannot kill the
/// process before the session gets to drain.
fn listen_for_interrupt(runtime: &Runtime) -> Result<InterruptFlag> {
    let flag = InterruptFlag::new();
    let raised = flag.clone();
    let (installed, ready) = tokio::sync::oneshot::channel();

    runtime.spawn(async move {
        let mut ctrl_c = pin!(tokio::signal::ctrl_c());
        // The handler is installed on the first poll
        let first = std::future::poll_fn(|cx| Poll::Ready(ctrl_c.as_mut().poll(cx))).await;
        let _ = installed.send(());
        let outcome = match first {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => ctrl_c.await,
        };
        match outcome {
            Ok(()) => raised.raise(),
            Err(e) => warn!("Cannot listen for Ctrl+C: {}", e),
        }
    });

    ready.blocking_recv().context("Ctrl+C listener exited early")?;
    Ok(flag)
}

fn run_log(args: LogArgs) -> Result<()> {
    let selector = match (&args.serial, &args.device) {
        (Some(serial), _) => DeviceSelector::serial(serial)?,
        (None, Some(vid_pid)) => DeviceSelector::vid_pid(vid_pid)?,
        (None, None) => DeviceSelector::First,
    };
    let config = SessionConfig::default().with_checksum(args.crc).with_alpha(args.alpha);

    let meter = find_meter(&selector).with_context(|| format!("Failed to find {selector}"))?;
    let listing = meter.listing();
    info!(
        "Using {} {}:{} (serial {})",
        listing.kind,
        listing.vendor_id,
        listing.product_id,
        listing.serial.as_deref().unwrap_or("-")
    );

    let runtime = runtime()?;
    let interrupt = listen_for_interrupt(&runtime)?;
    let options = if args.no_reset {
        OpenOptions::default().skip_reset()
    } else {
        OpenOptions::default()
    };
    let transport =
        NusbTransport::open(&meter.info, &options, runtime.handle().clone()).context("Failed to open meter")?;
    let mut session = Session::new(transport, meter.identity, config)?;

    let mut sink = OutputSink::create(args.format, Some(args.output.as_path()))
        .with_context(|| format!("Failed to open output {:?}", args.output))?;

    let mut stop = AnyStop::new().with(FileStop::new(&args.stop_file)).with(interrupt);
    if let Some(duration) = args.duration {
        stop.push(Deadline::after(duration));
    }

    info!("Logging to {:?}; create {:?} or press Ctrl+C to stop", args.output, args.stop_file);
    let report = session
        .run(&mut sink, &mut stop, &mut TracingObserver)
        .context("Logging session failed")?;

    info!(
        "Done: {} samples from {} frames, {:.6} Ws, {:.6} As",
        report.samples_emitted, report.frames_read, report.energy_ws, report.charge_as
    );
    if report.checksum_failures > 0 || report.frames_truncated > 0 {
        warn!(
            "{} frame(s) failed the CRC check, {} were short",
            report.checksum_failures, report.frames_truncated
        );
    }
    Ok(())
}
