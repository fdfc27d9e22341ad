//! # LXI Instrument Simulator
//!
//! Serves a simulated SCPI instrument on a raw LXI socket so that clients can
//! be exercised without hardware on the bench.
//!
//! ## Overview
//!
//! Two instruments are available: a four-channel oscilloscope that serves
//! waveforms and screenshots as definite-length blocks, and a single-channel
//! power supply with a resistive load.
pub mod backends;

use std::error::Error;
use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use env_logger::Env;
use lxi_protocol::DEFAULT_PORT;
use lxi_server::server::{Config, Server};

use crate::backends::{oscilloscope::Oscilloscope, power_supply::PowerSupply};

#[derive(Parser, PartialEq, Clone, Debug)]
enum InstrumentKind {
    Oscilloscope {
        #[arg(short = 'n', long, help = "Samples per waveform", default_value = "1200")]
        points: usize,
        #[arg(short, long, help = "Signal frequency in hertz", default_value = "1000.0")]
        frequency: f64,
    },
    PowerSupply {
        #[arg(short, long, help = "Highest settable voltage", default_value = "30.0")]
        max_voltage: f64,
    },
}

impl Default for InstrumentKind {
    fn default() -> Self {
        InstrumentKind::Oscilloscope {
            points: 1200,
            frequency: 1000.0,
        }
    }
}

#[derive(Parser)]
#[command(about = "Simulated SCPI instruments on a raw LXI socket", long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value = "127.0.0.1")]
    ip: IpAddr,

    #[clap(subcommand)]
    instrument: Option<InstrumentKind>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    log::info!("Starting LXI simulator");

    let args = Args::parse();
    log::debug!("Parsed arguments: ip={}, port={}", args.ip, args.port);

    let config = Config::default();
    log::debug!("Server config: max_command_len={}", config.max_command_len);

    let addr = SocketAddr::new(args.ip, args.port);
    log::info!("Binding to address: {}", addr);

    let served = match args.instrument.unwrap_or_default() {
        InstrumentKind::Oscilloscope { points, frequency } => {
            if !(frequency.is_finite() && frequency > 0.0) {
                return Err(format!("frequency must be positive, got {frequency}").into());
            }
            log::info!(
                "Simulating an oscilloscope: {} points at {} Hz",
                points,
                frequency
            );
            let server = Server::new(Oscilloscope::new(points, frequency), config);
            run(server.listen(addr)).await
        }
        InstrumentKind::PowerSupply { max_voltage } => {
            log::info!("Simulating a power supply up to {} V", max_voltage);
            let server = Server::new(PowerSupply::new(max_voltage), config);
            run(server.listen(addr)).await
        }
    };
    served?;
    Ok(())
}

/// Serves until the listener fails or Ctrl-C is pressed.
async fn run(listen: impl Future<Output = std::io::Result<()>>) -> std::io::Result<()> {
    tokio::select! {
        result = listen => result,
        signal = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            signal
        }
    }
}
