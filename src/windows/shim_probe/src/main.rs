//! Pushes a message to the host through the escape shim from user mode.
//!
//! ```text
//! > shim_probe.exe "hello from the guest"
//! Hypervisor: VMwareVMware
//! Forwarded "hello from the guest"
//! ```
//!
//! The message appears in the `vmware.log` of the VM.

use anyhow::{Context, Result, ensure};
use clap::Parser;
use escape_shim::{BackdoorTransport, EscapeLogger, LogChannel, ShimConfig};
use log::LevelFilter;

#[derive(Parser)]
#[command(author, about, long_about = None)]
struct Cli {
    /// The message to forward
    #[arg(default_value = "guest ready")]
    message: String,

    /// Forward the log records of the shim itself as well
    #[arg(short, long)]
    verbose: bool,
}

static CHANNEL: LogChannel<BackdoorTransport> = LogChannel::with_config(
    BackdoorTransport::new(),
    ShimConfig::DEFAULT.with_level(LevelFilter::Debug),
);

static LOGGER: EscapeLogger = EscapeLogger::new(&CHANNEL);

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        LOGGER.install()?;
    } else {
        env_logger::init();
    }

    println!(
        "Hypervisor: {}",
        hypervisor_vendor().unwrap_or_else(|| "<none>".to_string())
    );

    escape_shim::install(&CHANNEL)?;
    escape_shim::init().context("failed to open the escape channel")?;
    escape_shim::log(&cli.message);
    let stats = CHANNEL.stats();
    escape_shim::terminate();

    ensure!(
        stats.transport_failures == 0,
        "the host did not accept the message"
    );
    println!("Forwarded {:?}", cli.message);
    Ok(())
}

fn hypervisor_vendor() -> Option<String> {
    if raw_cpuid::cpuid!(0x1).ecx & (1 << 31) == 0 {
        return None;
    }
    let regs = raw_cpuid::cpuid!(0x4000_0000);
    let mut vec = regs.ebx.to_le_bytes().to_vec();
    vec.extend(regs.ecx.to_le_bytes());
    vec.extend(regs.edx.to_le_bytes());
    Some(String::from_utf8_lossy(vec.as_slice()).into_owned())
}
