//! Logging setup for binaries, demos and tests
//!
//! The level defaults to `Info` and can be refined with `RUST_LOG`,
//! e.g. `RUST_LOG=qrlew_private_reader=debug`.

use env_logger::Builder;
use log::LevelFilter;
pub use log::{debug, info, warn};

pub fn init() {
    // Init the logger
    let mut builder = Builder::from_default_env();
    builder.filter(None, LevelFilter::Info).init();
}

/// Same as [init] but does not fail if a logger is already set (useful in tests)
pub fn try_init() {
    let mut builder = Builder::new();
    builder.filter(None, LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.is_test(true).try_init();
}
