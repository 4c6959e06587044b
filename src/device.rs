//! The backend contract and an in-memory reference implementation used by
//! tests and examples. Real flash/EEPROM drivers implement the same trait
//! against their own hardware.

use std::fmt;
use thiserror::Error;

/// Uniform device contract the store programs against.
///
/// Only `read` and `prog` are mandatory; the rest default to no-ops, which
/// is correct for a backend with no read-back check, no end-marker, and no
/// OS-level init/lock requirements.
pub trait Backend {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read `out.len()` bytes starting at `off`.
    fn read(&mut self, off: u32, out: &mut [u8]) -> Result<(), Self::Error>;

    /// Program `data` starting at `off`. Must wipe any erase unit on its
    /// first program to the unit's first byte, so the store never has to
    /// know erase-unit geometry.
    fn prog(&mut self, off: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Optional read-back compare. Default accepts whatever was written.
    fn comp(&mut self, _off: u32, _data: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Optional end-marker notification, called with the post-write offset
    /// after every successful append. EEPROM backends may stamp a
    /// terminator here; flash backends no-op.
    fn sync(&mut self, _next_pos: u32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn lock(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A `Vec<u8>`-backed region that behaves like a byte-addressable memory
/// device: no erase-before-write requirement, reads and programs never
/// fail. Used by this crate's own tests in place of a real flash or EEPROM
/// driver, and a reasonable starting point for simulating media faults
/// (wrap it and fail on demand).
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Vec<u8>,
}

impl MemoryBackend {
    /// Creates a region of `size` bytes, all initialized to the fill byte
    /// `0xFF` (the erased state of NOR flash and most EEPROMs).
    pub fn new(size: usize) -> Self {
        MemoryBackend {
            data: vec![0xFF; size],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw access for test setup (e.g. simulating a truncated/corrupted
    /// region, or a half-finished GC).
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Error)]
pub enum MemoryBackendError {
    #[error("access [{off}, {off_end}) is out of bounds for a {size}-byte region")]
    OutOfBounds { off: u32, off_end: u64, size: usize },
}

impl Backend for MemoryBackend {
    type Error = MemoryBackendError;

    fn read(&mut self, off: u32, out: &mut [u8]) -> Result<(), Self::Error> {
        let end = off as u64 + out.len() as u64;
        if end > self.data.len() as u64 {
            return Err(MemoryBackendError::OutOfBounds {
                off,
                off_end: end,
                size: self.data.len(),
            });
        }
        let off = off as usize;
        out.copy_from_slice(&self.data[off..off + out.len()]);
        Ok(())
    }

    fn prog(&mut self, off: u32, data: &[u8]) -> Result<(), Self::Error> {
        let end = off as u64 + data.len() as u64;
        if end > self.data.len() as u64 {
            return Err(MemoryBackendError::OutOfBounds {
                off,
                off_end: end,
                size: self.data.len(),
            });
        }
        let off = off as usize;
        self.data[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn comp(&mut self, off: u32, data: &[u8]) -> Result<(), Self::Error> {
        let mut buf = vec![0u8; data.len()];
        self.read(off, &mut buf)?;
        if buf != data {
            log::warn!("comp mismatch at offset {off}");
        }
        Ok(())
    }
}

impl fmt::Display for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryBackend({} bytes)", self.data.len())
    }
}
