//! Forward scanning, prefix/uniqueness filtering, and key lookup.

use std::ops::ControlFlow;

use crate::crc::Crc32;
use crate::device::Backend;
use crate::entry::{decode_header, Entry, HEADER_SIZE, WRAP_COUNTER_SIZE};
use crate::error::KvsError;
use crate::KvStore;

fn key_matches_prefix(key: &[u8], prefix: &[u8]) -> bool {
    key.len() >= prefix.len() && &key[..prefix.len()] == prefix
}

impl<B: Backend> KvStore<B> {
    /// `None` means the header failed its CRC-8 or the decoded extent would
    /// leave the block: end of live data, not a backend failure.
    pub(crate) fn decode_entry(&mut self, start: u32) -> Result<Option<Entry>, KvsError<B::Error>> {
        let block_end = self.geometry.block_base(start) + self.geometry.block_size;
        let mut hdr = [0u8; 4];
        self.backend.read(start, &mut hdr).map_err(KvsError::Io)?;
        let Some((key_len, val_len)) = decode_header(&hdr) else {
            return Ok(None);
        };
        let next = crate::entry::round_up(
            start + HEADER_SIZE + key_len as u32 + val_len as u32 + crate::entry::PAYLOAD_CRC_SIZE,
            self.geometry.program_granularity,
        );
        if next > block_end || next <= start {
            return Ok(None);
        }
        Ok(Some(Entry {
            start,
            next,
            key_len,
            val_len,
        }))
    }

    pub(crate) fn read_key(&mut self, entry: &Entry) -> Result<Vec<u8>, KvsError<B::Error>> {
        let mut buf = vec![0u8; entry.key_len as usize];
        self.backend
            .read(entry.key_offset(), &mut buf)
            .map_err(KvsError::Io)?;
        Ok(buf)
    }

    pub(crate) fn read_value(&mut self, entry: &Entry) -> Result<Vec<u8>, KvsError<B::Error>> {
        let mut buf = vec![0u8; entry.val_len as usize];
        self.backend
            .read(entry.value_offset(), &mut buf)
            .map_err(KvsError::Io)?;
        Ok(buf)
    }

    pub(crate) fn read_block_wrap_counter(
        &mut self,
        entry: &Entry,
    ) -> Result<u32, KvsError<B::Error>> {
        let mut buf = [0u8; WRAP_COUNTER_SIZE as usize];
        self.backend
            .read(entry.value_offset(), &mut buf)
            .map_err(KvsError::Io)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Checked lazily, only once an entry is about to be handed to a caller
    /// or copied by GC.
    pub(crate) fn verify_payload_crc(&mut self, entry: &Entry) -> Result<bool, KvsError<B::Error>> {
        let payload_len = entry.crc_offset() - entry.key_offset();
        let mut hasher = Crc32::new();
        let mut off = entry.key_offset();
        let mut remaining = payload_len;
        let mut buf = [0u8; 16];
        while remaining > 0 {
            let n = remaining.min(buf.len() as u32);
            self.backend
                .read(off, &mut buf[..n as usize])
                .map_err(KvsError::Io)?;
            hasher.update(&buf[..n as usize]);
            off += n;
            remaining -= n;
        }
        let mut crc_buf = [0u8; 4];
        self.backend
            .read(entry.crc_offset(), &mut crc_buf)
            .map_err(KvsError::Io)?;
        Ok(hasher.finalize() == u32::from_le_bytes(crc_buf))
    }

    /// Walks entry-by-entry from `next` to `stop`, skipping stale blocks and
    /// filtering by `prefix` before handing a candidate to `on_match`.
    pub(crate) fn walk_raw<F>(
        &mut self,
        mut next: u32,
        stop: u32,
        prefix: &[u8],
        mut on_match: F,
    ) -> Result<ControlFlow<()>, KvsError<B::Error>>
    where
        F: FnMut(&mut Self, Entry, &[u8]) -> Result<ControlFlow<()>, KvsError<B::Error>>,
    {
        let region_size = self.geometry.region_size();
        loop {
            let start = if next < region_size { next } else { 0 };
            if start == stop {
                break;
            }

            match self.decode_entry(start)? {
                None => {
                    next = self.geometry.block_base(start) + self.geometry.block_size;
                }
                Some(entry) => {
                    next = entry.next;
                    let mut stale_block = false;
                    if entry.is_block_header() && self.geometry.is_block_aligned(start) {
                        let wrapcnt = self.read_block_wrap_counter(&entry)?;
                        if wrapcnt + 1 < self.cursor.wrap_counter {
                            next = start + self.geometry.block_size;
                            stale_block = true;
                        }
                    }
                    if !stale_block {
                        let key = self.read_key(&entry)?;
                        if key_matches_prefix(&key, prefix) && self.verify_payload_crc(&entry)? {
                            if let ControlFlow::Break(()) = on_match(self, entry, &key)? {
                                return Ok(ControlFlow::Break(()));
                            }
                        }
                    }
                }
            }

            if next == stop {
                break;
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Like [`Self::walk_raw`], but excludes block headers and suppresses a
    /// candidate if a later entry with the same key exists up to the
    /// current write position.
    pub(crate) fn walk_unique_raw<F>(
        &mut self,
        start: u32,
        stop: u32,
        prefix: &[u8],
        mut on_unique: F,
    ) -> Result<ControlFlow<()>, KvsError<B::Error>>
    where
        F: FnMut(&mut Self, Entry, &[u8]) -> Result<ControlFlow<()>, KvsError<B::Error>>,
    {
        self.walk_raw(start, stop, prefix, |store, entry, key| {
            if entry.is_block_header() {
                return Ok(ControlFlow::Continue(()));
            }

            let dup_stop = store.cursor.pos;
            let mut duplicate = false;
            store.walk_raw(entry.next, dup_stop, key, |_store, candidate, _candidate_key| {
                if candidate.key_len == entry.key_len {
                    duplicate = true;
                    return Ok(ControlFlow::Break(()));
                }
                Ok(ControlFlow::Continue(()))
            })?;

            if duplicate {
                return Ok(ControlFlow::Continue(()));
            }
            on_unique(store, entry, key)
        })
    }

    /// Newest, non-tombstone entry for an exact key, searching backwards one
    /// block at a time.
    pub(crate) fn entry_get(&mut self, key: &[u8]) -> Result<Option<Entry>, KvsError<B::Error>> {
        let block_size = self.geometry.block_size;
        let live_block_count = self.geometry.block_count - self.geometry.spare_count;

        let mut stop = self.cursor.pos;
        let mut start = self.cursor.bend - block_size;
        let mut found: Option<Entry> = None;

        for _ in 0..live_block_count {
            let mut last_match: Option<Entry> = None;
            self.walk_raw(start, stop, key, |_store, entry, _key| {
                if entry.key_len as usize == key.len() {
                    last_match = Some(entry);
                }
                Ok(ControlFlow::Continue(()))
            })?;
            if let Some(entry) = last_match {
                found = Some(entry);
                break;
            }
            stop = if start == 0 {
                self.geometry.region_size()
            } else {
                start
            };
            start = stop - block_size;
        }

        match found {
            Some(entry) if entry.val_len != 0 => Ok(Some(entry)),
            _ => Ok(None),
        }
    }
}
