//! modelrpc CLI library: demo services and command implementations shared
//! by the `modelrpc` binary and its integration tests.

pub mod commands;
pub mod demo;
