//! A guest-side escape shim: forwards log messages from guest driver code to a
//! listener on the host through a privileged escape or hypervisor backdoor,
//! and degrades to a no-op whenever that path is unavailable.

#![cfg_attr(not(test), no_std)]

pub mod shim;

#[cfg(all(target_arch = "x86_64", feature = "backdoor"))]
pub use shim::backdoor::BackdoorTransport;
pub use shim::{
    ChannelState, ENTRY_POINTS, EscapeLogger, EscapeShim, EscapeTransport, HookRegistry,
    InitError, LogChannel, ShimConfig, ShimEntryPoints, init, install, log, log_formatted,
    on_host_log_request, terminate,
};

// Only the backdoor transport issues CPUID.
#[cfg(all(target_arch = "x86_64", not(feature = "backdoor")))]
use x86 as _;

#[cfg(test)]
#[ctor::ctor]
unsafe fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
