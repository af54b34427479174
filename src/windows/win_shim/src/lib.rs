//! The escape shim hosted by a Windows kernel driver.
//!
//! On load, the driver opens a channel to the host over the VMware backdoor and
//! routes its messages, and those of the `log` crate, through a hook registry
//! to both the host and the kernel debugger. When the host cannot be reached,
//! only the debugger hook is installed and the driver keeps running.

#![no_std]

mod eprintln;

use escape_shim::{
    BackdoorTransport, ENTRY_POINTS, EscapeLogger, HookRegistry, LogChannel, ShimConfig,
};
use wdk_sys::{DRIVER_OBJECT, NTSTATUS, PCUNICODE_STRING, STATUS_SUCCESS};

static CHANNEL: LogChannel<BackdoorTransport> =
    LogChannel::with_config(BackdoorTransport::new(), ShimConfig::DEFAULT);

static LOGGER: EscapeLogger = EscapeLogger::new(&CHANNEL);

static HOOKS: HookRegistry<2> = HookRegistry::new();

#[unsafe(link_section = "INIT")]
#[unsafe(export_name = "DriverEntry")]
extern "system" fn driver_entry(
    driver: &mut DRIVER_OBJECT,
    _registry_path: PCUNICODE_STRING,
) -> NTSTATUS {
    eprintln!("Loading win_shim.sys");
    driver.DriverUnload = Some(driver_unload);

    if let Err(e) = HOOKS.install("debugger", eprintln::debugger_sink) {
        eprintln!("Failed to install the debugger hook: {e}");
    }

    // Neither failure below is fatal: the driver simply loses host logging.
    if let Err(e) = escape_shim::install(&CHANNEL) {
        eprintln!("{e}");
    }
    match escape_shim::init() {
        Ok(()) => {
            if let Err(e) = HOOKS.install("escape-shim", ENTRY_POINTS.log_sink) {
                eprintln!("Failed to install the escape hook: {e}");
            }
            if let Err(e) = LOGGER.install() {
                eprintln!("Failed to install the logger: {e}");
            }
        }
        Err(e) => eprintln!("Host logging is disabled: {e}"),
    }

    let _ = HOOKS.dispatch("Loaded win_shim.sys");
    log::info!("Host channel state: {}", escape_shim::shim::state());
    STATUS_SUCCESS
}

unsafe extern "C" fn driver_unload(_driver: *mut DRIVER_OBJECT) {
    let _ = HOOKS.dispatch("Unloading win_shim.sys");
    HOOKS.clear();
    escape_shim::terminate();
    eprintln!("Unloaded win_shim.sys");
}

#[cfg(not(test))]
#[panic_handler]
fn panic_handler(info: &core::panic::PanicInfo<'_>) -> ! {
    eprintln!("{info}");
    if unsafe { *wdk_sys::KdDebuggerNotPresent } == 0 {
        wdk::dbg_break();
    }
    loop {
        core::hint::spin_loop();
    }
}
