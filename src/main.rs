use dnp_supply::printer::{AttachError, MediaReport, Printer, QueryConfig};

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info};

/// Ask a DNP photo printer how many prints are left on the installed media.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// USB vendor ID of the printer (hex).
    #[arg(long, value_parser = parse_hex_id, default_value = "0x1452")]
    vendor_id: u16,

    /// USB product ID of the printer (hex).
    #[arg(long, value_parser = parse_hex_id, default_value = "0x9201")]
    product_id: u16,

    /// USB interface to claim.
    #[arg(long, default_value_t = 0)]
    interface: u8,

    /// Maximum number of reads for the response.
    #[arg(long, default_value_t = 3)]
    reads: usize,

    /// Timeout for a single read in milliseconds.
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    read_timeout: u64,

    /// Pause between the command and the first read in milliseconds.
    #[arg(long, default_value_t = 1000)]
    settle: u64,

    /// Do not give the interface back to the kernel driver on exit.
    #[arg(long)]
    keep_detached: bool,
}

impl Cli {
    fn query_config(&self) -> QueryConfig {
        QueryConfig {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            interface: self.interface,
            read_attempts: self.reads,
            read_timeout: Duration::from_millis(self.read_timeout),
            settle_delay: Duration::from_millis(self.settle),
            reattach_kernel_driver: !self.keep_detached,
            ..QueryConfig::default()
        }
    }
}

fn parse_hex_id(value: &str) -> Result<u16, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);

    u16::from_str_radix(digits, 16).map_err(|err| format!("Invalid USB ID {:?}: {}", value, err))
}

fn print_report(report: &MediaReport) {
    for (i, chunk) in report.chunks.iter().enumerate() {
        println!("Raw response (read {}): {:?}", i + 1, chunk.text);
        println!("Hex response (read {}): {:02x?}", i + 1, chunk.raw);
    }

    println!("Combined response: {:?}", report.combined);
    println!("Queried at: {}", report.queried_at.format("%Y-%m-%d %H:%M:%S"));

    match &report.quantity {
        Ok(quantity) => println!("Prints remaining: {}", quantity),
        Err(err) => println!("Could not parse prints remaining info: {}", err),
    }
}

fn run(config: &QueryConfig) -> Result<(), Box<dyn std::error::Error>> {
    let printer = Printer::attach(config).map_err(|err| {
        if let AttachError::USBError(rusb::Error::Access | rusb::Error::Busy)
        | AttachError::ConfigurationFailed(rusb::Error::Access | rusb::Error::Busy) = err
        {
            info!("Run as root and stop services holding the printer (e.g. `systemctl stop cups`).");
        }
        err
    })?;
    debug!("Kernel driver: {:?}", printer.detach_outcome());

    info!("Sending MEDIA command to printer...");
    let report = printer.query_media(config)?;
    print_report(&report);

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(&cli.query_config()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
