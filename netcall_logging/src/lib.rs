//! Subscriber setup shared by the netcall binaries and test suites.
//!
//! The library crates only emit records through the `log` facade under the `netcall`
//! target. Installing the subscriber here bridges those records into `tracing` and filters
//! them with `RUST_LOG`, e.g. `RUST_LOG=netcall=trace`.

pub use tracing::{self, debug, error, info, instrument, trace, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the subscriber along with a panic hook that logs the panic before exiting.
pub fn setup_log() {
    std::panic::set_hook(Box::new(|info| {
        error!(target: "netcall", "Panic occurred: {}", info);
        std::process::exit(1);
    }));

    setup_log_no_panic_hook()
}

/// Installs the subscriber using the `RUST_LOG` filter. Repeated calls are no-ops.
pub fn setup_log_no_panic_hook() {
    install(EnvFilter::from_default_env())
}

/// Installs the subscriber with explicit filter directives, ignoring `RUST_LOG`.
pub fn setup_log_with_filter(directives: &str) {
    install(EnvFilter::new(directives))
}

fn install(filter: EnvFilter) {
    let _ = SubscriberBuilder::default()
        .with_line_number(true)
        .with_file(true)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_env_filter(filter)
        .finish()
        .try_init();
}
