// Dependencies of the library are visible to every test crate.
#![allow(unused_crate_dependencies)]

mod common;

use std::{sync::Arc, thread};

use common::RecordingTransport;
use escape_shim::{ChannelState, InitError, LogChannel, ShimConfig};

#[ctor::ctor]
unsafe fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn guest_ready_then_ignored() {
    let channel = LogChannel::new(RecordingTransport::new());

    assert_eq!(channel.init(), Ok(()));
    channel.log("guest ready");
    assert_eq!(channel.transport().messages(), ["guest ready"]);

    channel.terminate();
    channel.log("ignored");
    assert_eq!(channel.transport().messages(), ["guest ready"]);
    assert_eq!(channel.state(), ChannelState::Closed);
}

#[test]
fn failed_init_is_reported_once_and_logging_stays_silent() {
    let channel = LogChannel::new(RecordingTransport::new());
    channel
        .transport()
        .fail_open
        .store(true, std::sync::atomic::Ordering::SeqCst);

    assert_eq!(channel.init(), Err(InitError::DriverNotLoaded));
    channel.log("nobody hears this");
    channel.log_formatted(format_args!("nor {}", "this"));
    channel.terminate();

    assert!(channel.transport().messages().is_empty());
    assert_eq!(channel.stats().dropped, 2);
    assert_eq!(
        channel
            .transport()
            .opens
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[test]
fn reopening_uses_a_fresh_token() {
    let channel = Arc::new(LogChannel::new(RecordingTransport::new()));

    for generation in 0..5 {
        channel.init().unwrap();
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    for i in 0..50 {
                        channel.log_formatted(format_args!("{generation}/{worker}/{i}"));
                    }
                })
            })
            .collect();
        channel.terminate();
        for worker in workers {
            worker.join().unwrap();
        }
    }

    assert_eq!(channel.transport().stale_submissions(), 0);
    assert_eq!(channel.stats().acquisitions, 5);
    let stats = channel.stats();
    assert_eq!(stats.forwarded + stats.dropped, 5 * 4 * 50);
}

#[test]
fn short_limit_truncates_everything() {
    let channel = LogChannel::with_config(
        RecordingTransport::new(),
        ShimConfig::DEFAULT.with_max_message_len(4),
    );
    channel.init().unwrap();

    channel.log("abcdefgh");
    channel.log_formatted(format_args!("{}", 123_456));
    channel.log("");

    assert_eq!(channel.transport().messages(), ["abcd", "1234", ""]);
}
