//! Single-file, disk-backed B+ tree index for fixed-width keys and records.

mod delete;
mod error;
mod insert;
mod key;
mod node;
mod search;
mod store;
mod tree;

pub use error::Error;
pub use key::{Key, Value, KEY_SIZE, VALUE_SIZE, VALUE_TEXT_SIZE};
pub use node::{Header, ORDER};
pub use tree::Tree;

/// Test-only tracing init, same `EnvFilter` shape as the teacher's
/// `main.rs` (defaulting to `trace` rather than requiring `RUST_LOG`), but
/// writing through `with_test_writer()` so output is captured per-test
/// instead of appending to a log file.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trace")),
            )
            .try_init();
    });
}
