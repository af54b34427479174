//! The escape shim hosted by a UEFI application.
//!
//! Opens a channel to the host over the VMware backdoor, announces the guest
//! to it and closes the channel again. Messages land in the `vmware.log` of
//! the VM; failures are printed to the console and are not fatal.

#![no_main]
#![no_std]

mod println;

use escape_shim::{BackdoorTransport, EscapeLogger, LogChannel, ShimConfig};
use log::LevelFilter;
use uefi::prelude::*;

static CHANNEL: LogChannel<BackdoorTransport> = LogChannel::with_config(
    BackdoorTransport::new(),
    ShimConfig::DEFAULT.with_level(LevelFilter::Debug),
);

static LOGGER: EscapeLogger = EscapeLogger::new(&CHANNEL);

#[entry]
fn main() -> Status {
    println!("Loading uefi_shim.efi");

    if let Err(e) = escape_shim::install(&CHANNEL) {
        println!("{e}");
        return Status::ABORTED;
    }
    if let Err(e) = LOGGER.install() {
        println!("Failed to install the logger: {e}");
    }

    if let Err(e) = escape_shim::init() {
        println!("Host logging is disabled: {e}");
        return Status::SUCCESS;
    }

    escape_shim::log("guest ready");
    escape_shim::shim_log!(
        "firmware revision {:#x}, UEFI {}",
        uefi::system::firmware_revision(),
        uefi::system::uefi_revision()
    );
    log::info!("Closing the channel");
    escape_shim::terminate();

    println!(
        "Forwarded {} message(s) to the host",
        CHANNEL.stats().forwarded
    );
    Status::SUCCESS
}

#[panic_handler]
fn panic_handler(info: &core::panic::PanicInfo<'_>) -> ! {
    println!("{info}");
    loop {
        core::hint::spin_loop();
    }
}
