//! Shared code for the integration test harness.

use std::sync::Once;

use lazy_static::lazy_static;

lazy_static! {
    static ref TRACING_INIT: Once = Once::new();
}

pub fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    TRACING_INIT.call_once(|| {
        let fmt_layer = fmt::layer().compact().with_target(false);
        let filter_layer =
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).expect("initializing logging");
        tracing_subscriber::registry().with(filter_layer).with(fmt_layer).init();
    });
}
