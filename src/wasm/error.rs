//! Error types for the WASM host.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("engine creation failed: {0}")]
    EngineCreation(String),
    #[error("failed to read module {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("module compilation failed: {0}")]
    Compilation(String),
    #[error("import linking failed: {0}")]
    Link(String),
    #[error("memory creation failed: {0}")]
    Memory(String),
    #[error("instantiation failed: {0}")]
    Instantiation(String),
    #[error("guest trapped: {0}")]
    Trap(String),
    #[error("{}", assertion_message(*line))]
    AssertionFailed { line: Option<i32> },
    #[error("out-of-bounds read: {len} bytes at offset {offset} (memory size {size})")]
    OutOfBounds { offset: u64, len: u64, size: usize },
    #[error("no linear memory available to the host")]
    NoMemory,
    #[error("output write failed: {0}")]
    Output(#[from] std::io::Error),
}

fn assertion_message(line: Option<i32>) -> String {
    match line {
        Some(line) => format!("Assertion failed on line {line}"),
        None => "Assertion failed".to_string(),
    }
}

pub type HostResult<T> = Result<T, HostError>;
