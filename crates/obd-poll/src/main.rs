//! OBD-II Sensor Poller - Main Entry Point
//!
//! Opens a serial ELM327 adapter, runs the session handshake, and prints
//! every supported registry sensor as JSON. With an interval argument it
//! keeps polling at that cadence.

use std::time::Duration;

use anyhow::Context;
use elm327::{ObdError, Pid, Session};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
const DEFAULT_BAUD: u32 = 38_400;

struct Args {
    device: String,
    baud: u32,
    interval: Option<Duration>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut argv = std::env::args().skip(1);

    let device = match argv.next() {
        Some(flag) if flag == "-h" || flag == "--help" => {
            eprintln!("usage: obd-poll [device] [baud] [interval-secs]");
            std::process::exit(0);
        }
        Some(device) => device,
        None => DEFAULT_DEVICE.to_string(),
    };
    let baud = match argv.next() {
        Some(raw) => raw.parse().with_context(|| format!("invalid baud rate '{raw}'"))?,
        None => DEFAULT_BAUD,
    };
    let interval = match argv.next() {
        Some(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("invalid interval '{raw}'"))?;
            Some(Duration::from_secs(secs))
        }
        None => None,
    };

    Ok(Args {
        device,
        baud,
        interval,
    })
}

fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Read every registry sensor once. Unsupported PIDs are skipped; other
/// per-sensor failures are logged and must not stop the sweep.
async fn poll_once<C>(session: &mut Session<C>) -> Vec<elm327::Reading>
where
    C: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut readings = Vec::new();
    for pid in Pid::ALL {
        match session.read_sensor(pid).await {
            Ok(reading) => readings.push(reading),
            Err(ObdError::PidNotSupported(code)) => {
                debug!("skipping unsupported PID {:02x}", code);
            }
            Err(e) => warn!("reading {} failed: {}", pid.name(), e),
        }
    }
    readings
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== obd-poll v{} ===", env!("CARGO_PKG_VERSION"));
    let args = parse_args()?;

    info!("opening {} at {} baud", args.device, args.baud);
    let port = tokio_serial::new(&args.device, args.baud)
        .open_native_async()
        .with_context(|| format!("failed to open {}", args.device))?;

    let mut session = Session::connect(port)
        .await
        .context("adapter handshake failed")?;
    info!("adapter: {}", session.adapter_id());
    info!("supported PIDs: {:?}", session.supported_pids());

    loop {
        let readings = poll_once(&mut session).await;
        println!("{}", serde_json::to_string_pretty(&readings)?);

        match args.interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => break,
        }
    }

    Ok(())
}
