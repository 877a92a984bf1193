//! Shared logging setup for tests.
//!
//! `RUST_LOG` overrides the default filter, which shows this crate's debug
//! output and hides the dependency crates that read configuration.

use std::sync::Once;

use tracing::debug;
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

static TEST_SETUP: Once = Once::new();

const DEFAULT_FILTER: &str = "clonetree=debug";
const NOISY_TARGETS: [&str; 2] = ["config", "toml"];

/// Installs the global subscriber once per test binary.
pub fn init_test_setup() {
    TEST_SETUP.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let quiet = filter_fn(|metadata| {
            !NOISY_TARGETS
                .iter()
                .any(|name| metadata.target().starts_with(name))
        });

        // test writer keeps output behind cargo's capture
        let layer = fmt::layer()
            .with_test_writer()
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(quiet)
            .with_filter(env_filter);

        match tracing_subscriber::registry().with(layer).try_init() {
            Ok(()) => debug!("test logging ready"),
            Err(e) => eprintln!("test logging not installed: {}", e),
        }
    });
}
