//! Output sinks for guest log lines.
//!
//! Production writes to stdout; tests capture into a shared buffer.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Where host imports write guest output. Owned by the store.
pub type OutputSink = Box<dyn Write + Send>;

/// Sink for the process stdout.
pub fn stdout_sink() -> OutputSink {
    Box::new(io::stdout())
}

/// A cloneable in-memory sink. All clones append to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed clone for handing to a run.
    pub fn sink(&self) -> OutputSink {
        Box::new(self.clone())
    }

    /// Everything written so far, decoded lossily.
    pub fn contents(&self) -> String {
        let buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Written output split into lines (without terminators).
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
