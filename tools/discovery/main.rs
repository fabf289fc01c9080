//! Serial Port Discovery Tool
//!
//! Lists the serial ports visible to the host and optionally probes one
//! instrument address with a query, so a new lab setup file can be written
//! without guessing device paths.
//!
//! # Usage
//!
//! ```bash
//! # List every serial port with USB descriptor details
//! cargo run --bin discovery
//!
//! # Send *IDN? to an instrument and print the reply
//! cargo run --bin discovery -- --probe "ETHER::10.0.0.5:5025"
//!
//! # Oxford-style instruments answer on carriage return framing
//! cargo run --bin discovery -- --probe "SERIAL::/dev/ttyUSB0" --query "@0V" --term cr
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::debug;
use std::time::Duration;

use cryolab::visa::{self, Instrument};

/// Discovery - list serial ports and probe instrument addresses
#[derive(Parser, Debug)]
#[command(name = "discovery")]
#[command(about = "List serial ports and probe instrument addresses", long_about = None)]
struct Args {
    /// Instrument address to probe, e.g. "SERIAL::/dev/ttyUSB0" or
    /// "ETHER::10.0.0.5:5025"
    #[arg(short, long, value_name = "ADDRESS")]
    probe: Option<String>,

    /// Query to send when probing
    #[arg(short, long, default_value = "*IDN?")]
    query: String,

    /// Termination sequence for the probe
    #[arg(long, value_enum, default_value_t = Termination::Default)]
    term: Termination,

    /// Reply timeout in seconds
    #[arg(short, long, default_value_t = 2.0)]
    timeout: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Framing choices for the probe query.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Termination {
    /// Whatever the transport's default is.
    Default,
    /// Carriage return (Oxford, serial instruments).
    Cr,
    /// Line feed (most GPIB and LAN instruments).
    Lf,
    /// Carriage return plus line feed (SR830, SMC).
    CrLf,
}

impl Termination {
    fn bytes(self) -> Option<&'static [u8]> {
        match self {
            Self::Default => None,
            Self::Cr => Some(b"\r"),
            Self::Lf => Some(b"\n"),
            Self::CrLf => Some(b"\r\n"),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    list_ports()?;

    if let Some(address) = &args.probe {
        probe(address, &args.query, args.term, args.timeout)?;
    }

    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("serial port enumeration failed")?;

    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!("Serial ports:");
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                let product = usb.product.as_deref().unwrap_or("unknown device");
                println!(
                    "  {}  USB {:04x}:{:04x}  {}",
                    port.port_name, usb.vid, usb.pid, product
                );
            }
            serialport::SerialPortType::PciPort => {
                println!("  {}  PCI", port.port_name);
            }
            serialport::SerialPortType::BluetoothPort => {
                println!("  {}  Bluetooth", port.port_name);
            }
            serialport::SerialPortType::Unknown => {
                println!("  {}", port.port_name);
            }
        }
    }
    Ok(())
}

fn probe(address: &str, query: &str, term: Termination, timeout: f64) -> Result<()> {
    let timeout = Duration::from_secs_f64(timeout);
    debug!("probing {address} with {query:?}");

    let mut instrument =
        visa::open(address, timeout).with_context(|| format!("could not open {address}"))?;
    if let Some(bytes) = term.bytes() {
        instrument.set_termination(bytes)?;
    }

    let reply = instrument
        .ask(query)
        .with_context(|| format!("no reply to {query:?} from {address}"))?;
    println!("{address} answered: {reply}");

    instrument.close()?;
    Ok(())
}
