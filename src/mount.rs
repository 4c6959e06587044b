//! Mount, recovery, and erase.

use std::ops::ControlFlow;

use crate::allocator::Cursor;
use crate::device::Backend;
use crate::error::KvsError;
use crate::KvStore;

impl<B: Backend> KvStore<B> {
    /// Brings the store online: locates the newest block header, the live
    /// write position within it, then repairs a GC pass that was
    /// interrupted mid-write before it marks itself ready.
    pub fn mount(&mut self) -> Result<(), KvsError<B::Error>> {
        if self.ready {
            return Err(KvsError::AlreadyMounted);
        }
        self.backend.init().map_err(KvsError::Io)?;
        self.backend.lock().map_err(KvsError::Io)?;
        let result = self.mount_locked();
        if result.is_ok() {
            self.ready = true;
            log::info!(
                "mounted: pos={}, bend={}, wrap_counter={}",
                self.cursor.pos,
                self.cursor.bend,
                self.cursor.wrap_counter
            );
        }
        let _ = self.backend.unlock();
        result
    }

    fn mount_locked(&mut self) -> Result<(), KvsError<B::Error>> {
        self.find_head_block()?;
        self.find_head_offset()?;
        self.recover()?;
        Ok(())
    }

    /// Finds the block with the largest valid wrap counter; that block
    /// holds the newest data. Ties are broken by preferring the later
    /// block in address order, matching the forward scan below.
    fn find_head_block(&mut self) -> Result<(), KvsError<B::Error>> {
        let geo = self.geometry();
        let mut wrap_counter = 0u32;
        let mut pos = 0u32;
        let mut bend = geo.block_size;

        for i in 0..geo.block_count {
            let base = i * geo.block_size;
            if let Some(entry) = self.decode_entry(base)? {
                if entry.is_block_header() {
                    let wc = self.read_block_wrap_counter(&entry)?;
                    if wc >= wrap_counter {
                        wrap_counter = wc;
                        pos = base;
                        bend = base + geo.block_size;
                    }
                }
            }
        }

        self.cursor = Cursor {
            pos,
            bend,
            wrap_counter,
        };
        Ok(())
    }

    /// Advances `pos` entry-by-entry within the head block until decoding
    /// fails; that is the live write position.
    fn find_head_offset(&mut self) -> Result<(), KvsError<B::Error>> {
        loop {
            match self.decode_entry(self.cursor.pos)? {
                Some(entry) => self.cursor.pos = entry.next,
                None => break,
            }
        }
        Ok(())
    }

    /// Detects a compaction that was interrupted mid-copy: the block just
    /// behind the live window should be empty once compaction finishes
    /// cleanly, so any unique live entry surviving there means the
    /// previous GC pass never completed. If so, rewind the write block and
    /// repeat compaction up to the (now corrected) stop cursor.
    fn recover(&mut self) -> Result<(), KvsError<B::Error>> {
        let geo = self.geometry();
        let start = geo.block_advance(self.cursor.bend, geo.spare_count - 1);
        let stop = geo.block_advance(self.cursor.bend, geo.spare_count);
        let write_block = geo.block_base(self.cursor.pos);

        let mut recovery_needed = false;
        self.walk_unique_raw(start, stop, &[], |store, entry, _key| {
            if store.geometry().block_base(entry.start) != write_block {
                recovery_needed = true;
            }
            Ok(ControlFlow::Continue(()))
        })?;

        if !recovery_needed {
            return Ok(());
        }

        log::warn!("interrupted compaction detected, repeating GC pass");
        self.cursor.bend = geo.block_base(self.cursor.pos);
        self.compact_to(self.cursor.bend)
    }

    /// Releases the backend without checking it is still valid. Safe to
    /// call on a store that is not currently mounted.
    pub fn unmount(&mut self) -> Result<(), KvsError<B::Error>> {
        self.backend.lock().map_err(KvsError::Io)?;
        self.ready = false;
        let _ = self.backend.unlock();
        self.backend.release().map_err(KvsError::Io)
    }

    /// Overwrites the entire region with the fill byte. Only valid while
    /// unmounted, so a live store is never erased out from under itself.
    pub fn erase(&mut self) -> Result<(), KvsError<B::Error>> {
        if self.ready {
            return Err(KvsError::AlreadyMounted);
        }
        self.backend.init().map_err(KvsError::Io)?;
        self.backend.lock().map_err(KvsError::Io)?;
        let result = self.erase_locked();
        let _ = self.backend.unlock();
        let _ = self.backend.release();
        result
    }

    fn erase_locked(&mut self) -> Result<(), KvsError<B::Error>> {
        let geo = self.geometry();
        let fill = vec![0xFFu8; geo.program_granularity as usize];
        let mut off = 0u32;
        let region_size = geo.region_size();
        while off < region_size {
            self.backend.prog(off, &fill).map_err(KvsError::Io)?;
            off += geo.program_granularity;
        }
        Ok(())
    }
}
