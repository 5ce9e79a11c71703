//! WASM host: runs a ChocoPy guest module against four logging imports.
//!
//! The guest owns all program logic; the host supplies linear memory and a
//! way to print. Nothing is returned to the guest.
//!
//! Architecture:
//! - `runtime.rs`: HostRuntime engine, module loading, linking, instantiation
//! - `imports.rs`: HostState + `logString`/`logInt`/`logBool`/`assert`
//! - `memory.rs`: page limits and length-prefixed string decoding
//! - `output.rs`: where guest lines go (stdout or a capture buffer)
//! - `error.rs`: HostError types

pub mod error;
pub mod imports;
pub mod memory;
pub mod output;
pub mod runtime;
