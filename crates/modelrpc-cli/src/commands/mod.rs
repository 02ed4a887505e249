//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and works on the
//! demo `AppState` from [`crate::demo`].

pub mod call;
pub mod schema;
pub mod serve;

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
