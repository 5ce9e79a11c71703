//! Linear memory: page limits and the length-prefixed string layout.
//!
//! The host only ever reads guest memory. A logged string lives at some
//! offset as a 4-byte little-endian length followed by that many UTF-8 bytes.

use wasmtime::MemoryType;

use super::error::{HostError, HostResult};

/// Largest page count a 32-bit linear memory can address.
pub const MAX_PAGES: u32 = 65_536;

/// Initial/maximum page counts for a host-created memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLimits {
    pub initial_pages: u32,
    pub maximum_pages: u32,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            initial_pages: 10,
            maximum_pages: 100,
        }
    }
}

impl MemoryLimits {
    pub fn new(initial_pages: u32, maximum_pages: u32) -> Self {
        Self {
            initial_pages,
            maximum_pages,
        }
    }

    /// Reject limits the engine would refuse (or that make no sense).
    pub fn validate(&self) -> HostResult<()> {
        if self.maximum_pages > MAX_PAGES {
            return Err(HostError::Config(format!(
                "maximum_pages {} exceeds the 32-bit limit of {MAX_PAGES}",
                self.maximum_pages
            )));
        }
        if self.initial_pages > self.maximum_pages {
            return Err(HostError::Config(format!(
                "initial_pages {} is larger than maximum_pages {}",
                self.initial_pages, self.maximum_pages
            )));
        }
        Ok(())
    }

    pub fn memory_type(&self) -> MemoryType {
        MemoryType::new(self.initial_pages, Some(self.maximum_pages))
    }
}

/// Decode the length-prefixed string at `offset` in `data`.
///
/// Invalid UTF-8 is replaced with U+FFFD rather than rejected. Any read past
/// the end of `data` is an [`HostError::OutOfBounds`].
pub fn read_length_prefixed(data: &[u8], offset: u32) -> HostResult<String> {
    let start = offset as usize;
    let prefix = start
        .checked_add(4)
        .and_then(|end| data.get(start..end))
        .ok_or(HostError::OutOfBounds {
            offset: offset as u64,
            len: 4,
            size: data.len(),
        })?;
    let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);

    let body_start = start + 4;
    let bytes = body_start
        .checked_add(len as usize)
        .and_then(|end| data.get(body_start..end))
        .ok_or(HostError::OutOfBounds {
            offset: body_start as u64,
            len: len as u64,
            size: data.len(),
        })?;

    Ok(String::from_utf8_lossy(bytes).into_owned())
}
