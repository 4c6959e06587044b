//! Append path and compaction/GC.

use crate::crc::Crc32;
use crate::device::Backend;
use crate::entry::{encode_header, entry_size, HEADER_SIZE, WRAP_COUNTER_SIZE};
use crate::error::KvsError;
use crate::KvStore;
use std::ops::ControlFlow;

impl<B: Backend> KvStore<B> {
    /// Programs `data` starting at `off`, poisoning the write cursor on any
    /// backend failure so a half-written entry is never mistaken for live
    /// data after the error is reported.
    pub(crate) fn program_or_poison(&mut self, off: u32, data: &[u8]) -> Result<(), KvsError<B::Error>> {
        if let Err(e) = self.backend.prog(off, data) {
            self.cursor.poison();
            return Err(KvsError::Io(e));
        }
        if let Err(e) = self.backend.comp(off, data) {
            self.cursor.poison();
            return Err(KvsError::Io(e));
        }
        Ok(())
    }

    /// Writes a fresh block header (wrap counter + cookie) at the current
    /// position, if the position is block-aligned: the first entry of a
    /// new block.
    pub(crate) fn write_block_header_if_needed(&mut self) -> Result<(), KvsError<B::Error>> {
        let geo = self.geometry();
        if !geo.is_block_aligned(self.cursor.pos) {
            return Ok(());
        }

        let val_len = WRAP_COUNTER_SIZE + self.cookie.len() as u32;
        let need = entry_size(0, val_len as u16, geo.program_granularity);
        let start = self.cursor.reserve(need).ok_or(KvsError::NoSpace)?;

        let mut buf = vec![0xFFu8; need as usize];
        buf[0..4].copy_from_slice(&encode_header(0, val_len as u16));
        buf[4..8].copy_from_slice(&self.cursor.wrap_counter.to_le_bytes());
        buf[8..8 + self.cookie.len()].copy_from_slice(&self.cookie);

        let mut crc = Crc32::new();
        crc.update(&self.cursor.wrap_counter.to_le_bytes());
        crc.update(&self.cookie);
        let crc_off = 8 + self.cookie.len();
        buf[crc_off..crc_off + 4].copy_from_slice(&crc.finalize().to_le_bytes());

        log::debug!(
            "writing block header at {start}, wrap_counter={}",
            self.cursor.wrap_counter
        );
        self.program_or_poison(start, &buf)
    }

    /// Appends one key/value entry at the current position, first emitting
    /// a block header if this is the first write into a fresh block.
    /// Returns `NoSpace` if the entry does not fit in the remainder of the
    /// current block; callers decide whether to advance/retry or trigger
    /// compaction.
    pub(crate) fn append_entry(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvsError<B::Error>> {
        self.write_block_header_if_needed()?;

        let granularity = self.geometry().program_granularity;
        let need = entry_size(key.len() as u8, value.len() as u16, granularity);
        let start = self.cursor.reserve(need).ok_or(KvsError::NoSpace)?;

        let mut buf = vec![0xFFu8; need as usize];
        buf[0..4].copy_from_slice(&encode_header(key.len() as u8, value.len() as u16));
        let key_off = HEADER_SIZE as usize;
        buf[key_off..key_off + key.len()].copy_from_slice(key);
        let val_off = key_off + key.len();
        buf[val_off..val_off + value.len()].copy_from_slice(value);

        let mut crc = Crc32::new();
        crc.update(key);
        crc.update(value);
        let crc_off = val_off + value.len();
        buf[crc_off..crc_off + 4].copy_from_slice(&crc.finalize().to_le_bytes());

        self.program_or_poison(start, &buf)?;
        self.backend.sync(self.cursor.pos).map_err(KvsError::Io)?;
        Ok(())
    }

    /// Copies one live entry forward during compaction, advancing to the
    /// next spare block and retrying if the destination block is full.
    /// Gives up after `spare_count` attempts.
    fn copy_entry_with_retry(&mut self, key: &[u8], value: &[u8]) -> Result<(), KvsError<B::Error>> {
        let attempts = self.geometry().spare_count;
        for _ in 0..attempts {
            match self.append_entry(key, value) {
                Ok(()) => return Ok(()),
                Err(KvsError::NoSpace) => {
                    let geo = self.geometry();
                    self.cursor.advance_block(&geo);
                }
                Err(e) => return Err(e),
            }
        }
        Err(KvsError::NoSpace)
    }

    /// Copies every live, unique, non-tombstone entry from the oldest live
    /// block up to `stop` into the current write block, skipping keys that
    /// have since been overwritten or deleted.
    pub(crate) fn compact_to(&mut self, stop: u32) -> Result<(), KvsError<B::Error>> {
        let geo = self.geometry();
        let start = geo.block_advance(self.cursor.bend, geo.spare_count);
        self.cursor.advance_block(&geo);

        log::debug!("compacting entries in [{start}, {stop}) forward");

        self.walk_unique_raw(start, stop, &[], |store, entry, key| {
            if entry.is_tombstone() {
                return Ok(ControlFlow::Continue(()));
            }
            let value = store.read_value(&entry)?;
            store.copy_entry_with_retry(key, &value)?;
            Ok(ControlFlow::Continue(()))
        })?;

        Ok(())
    }
}
