//! A log-structured key-value store for flash, EEPROM, and other
//! byte-addressable block storage.
//!
//! Keys and values are appended to a circular log spanning a fixed number
//! of equally-sized blocks. Reads walk the log backwards from the current
//! write position to find the newest record for a key; writes always
//! append; garbage collection reclaims space by copying the live tail of
//! the log forward into freshly erased blocks ahead of the write cursor.
//!
//! ```no_run
//! use logkvs::{KvStore, MemoryBackend, StoreConfig};
//!
//! let backend = MemoryBackend::new(4 * 256);
//! let config = StoreConfig {
//!     block_size: 256,
//!     block_count: 4,
//!     spare_count: 1,
//!     program_granularity: 1,
//!     cookie: vec![0xC0, 0xFF, 0xEE, 0x00],
//! };
//! let mut store = KvStore::new(backend, config).unwrap();
//! store.mount().unwrap();
//! store.write(b"answer", b"42").unwrap();
//! let mut buf = [0u8; 2];
//! store.read(b"answer", &mut buf).unwrap();
//! assert_eq!(&buf, b"42");
//! ```

mod allocator;
mod compact;
mod config;
mod crc;
mod device;
mod entry;
mod mount;
mod scan;

pub use allocator::{Cursor, Geometry};
pub use config::{ConfigError, StoreConfig};
pub use device::{Backend, MemoryBackend, MemoryBackendError};
pub use error::{KvsError, KvsResult};

mod error;

use std::ops::ControlFlow;

/// A mounted (or not-yet-mounted) store bound to one backend and one
/// validated geometry.
pub struct KvStore<B: Backend> {
    backend: B,
    geometry: Geometry,
    cookie: Vec<u8>,
    cursor: Cursor,
    ready: bool,
}

impl<B: Backend> KvStore<B> {
    /// Builds a store over `backend` with the given configuration. The
    /// store is not usable until [`KvStore::mount`] succeeds.
    pub fn new(backend: B, config: StoreConfig) -> Result<Self, ConfigError> {
        let geometry = config.validate()?;
        Ok(KvStore {
            backend,
            geometry,
            cookie: config.cookie,
            cursor: Cursor {
                pos: 0,
                bend: geometry.block_size,
                wrap_counter: 0,
            },
            ready: false,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The store's current write cursor. Mainly useful for tests and
    /// diagnostics; ordinary callers never need to reason about it.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn ensure_ready(&self) -> Result<(), KvsError<B::Error>> {
        if !self.ready {
            return Err(KvsError::InvalidArg);
        }
        Ok(())
    }

    /// Copies `buf.len()` bytes from the start of the newest non-tombstone
    /// value for `key`. Errors if `buf` is longer than the stored value;
    /// a short read is never used to peek into the trailing CRC or padding
    /// bytes.
    pub fn read(&mut self, key: &[u8], buf: &mut [u8]) -> Result<(), KvsError<B::Error>> {
        self.ensure_ready()?;
        let entry = self.entry_get(key)?.ok_or(KvsError::NotFound)?;
        if buf.len() > entry.val_len as usize {
            return Err(KvsError::InvalidArg);
        }
        self.backend
            .read(entry.value_offset(), buf)
            .map_err(KvsError::Io)
    }

    /// Appends `value` under `key`, unless an identical value is already
    /// the newest record (a byte-for-byte no-op write never touches the
    /// log). Triggers garbage collection, up to `block_count` times, if
    /// the current block has no room.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvsError<B::Error>> {
        self.ensure_ready()?;
        if key.is_empty() || key.len() > u8::MAX as usize {
            return Err(KvsError::InvalidArg);
        }
        if value.len() > u16::MAX as usize {
            return Err(KvsError::InvalidArg);
        }

        if let Some(existing) = self.entry_get(key)? {
            if existing.val_len as usize == value.len() {
                let existing_value = self.read_value(&existing)?;
                if existing_value == value {
                    return Ok(());
                }
            }
        }

        self.backend.lock().map_err(KvsError::Io)?;
        let result = self.write_locked(key, value);
        let _ = self.backend.unlock();
        result
    }

    fn write_locked(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvsError<B::Error>> {
        let mut remaining_attempts = self.geometry.block_count;
        while remaining_attempts > 0 {
            match self.append_entry(key, value) {
                Ok(()) => return Ok(()),
                Err(KvsError::NoSpace) => {
                    log::debug!("block full, compacting ({remaining_attempts} attempts left)");
                    let stop = self
                        .geometry
                        .block_advance(self.cursor.bend, self.geometry.spare_count + 1);
                    self.compact_to(stop)?;
                    remaining_attempts -= 1;
                }
                Err(e) => return Err(e),
            }
        }
        Err(KvsError::NoSpace)
    }

    /// Equivalent to `write(key, &[])`: appends a tombstone. A delete of a
    /// key with no live record still appends one.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), KvsError<B::Error>> {
        self.write(key, &[])
    }

    /// Invokes `f` with the key and value of every live entry whose key
    /// starts with `prefix`, in on-disk (oldest-to-newest) order;
    /// duplicates across overwrites are *not* filtered, use
    /// [`KvStore::walk_unique`] for that. Returns `Err(KvsError::UserStop)`
    /// if `f` returns `ControlFlow::Break`.
    pub fn walk<F>(&mut self, prefix: &[u8], mut f: F) -> Result<(), KvsError<B::Error>>
    where
        F: FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    {
        self.ensure_ready()?;
        let start = self
            .geometry
            .block_advance(self.cursor.bend, self.geometry.spare_count);
        let stop = self.cursor.pos;
        let outcome = self.walk_raw(start, stop, prefix, |store, entry, key| {
            let value = store.read_value(&entry)?;
            Ok(f(key, &value))
        })?;
        match outcome {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(()) => Err(KvsError::UserStop),
        }
    }

    /// Like [`KvStore::walk`], but visits each live key exactly once: the
    /// newest surviving record, with overwritten and deleted keys never
    /// reported (tombstones included).
    pub fn walk_unique<F>(&mut self, prefix: &[u8], mut f: F) -> Result<(), KvsError<B::Error>>
    where
        F: FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    {
        self.ensure_ready()?;
        let start = self
            .geometry
            .block_advance(self.cursor.bend, self.geometry.spare_count);
        let stop = self.cursor.pos;
        let outcome = self.walk_unique_raw(start, stop, prefix, |store, entry, key| {
            let value = store.read_value(&entry)?;
            Ok(f(key, &value))
        })?;
        match outcome {
            ControlFlow::Continue(()) => Ok(()),
            ControlFlow::Break(()) => Err(KvsError::UserStop),
        }
    }

    /// Forces a garbage-collection pass up to the current write block,
    /// reclaiming every block behind it that holds no live entry.
    pub fn compact(&mut self) -> Result<(), KvsError<B::Error>> {
        self.ensure_ready()?;
        self.backend.lock().map_err(KvsError::Io)?;
        let result = self.compact_to(self.cursor.bend);
        let _ = self.backend.unlock();
        result
    }
}
