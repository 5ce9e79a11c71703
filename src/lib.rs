//! chocohost: a minimal WebAssembly host for compiled ChocoPy programs.
//!
//! Loads a guest module (`.wasm` or `.wat`), gives it a linear memory and
//! the `imports` logging namespace, and lets its start function run.

pub mod config;
pub mod wasm;

pub use config::{ConfigOverrides, HostConfig};
pub use wasm::error::{HostError, HostResult};
pub use wasm::runtime::{GuestModule, HostRuntime, RunReport};
