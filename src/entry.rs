//! On-disk entry layout and the header codec.
//!
//! ```text
//! +0   header (4 bytes): key_len(1) | val_len_lo(1) | val_len_hi(1) | crc8(1)
//! +4   key (key_len bytes)
//! +4+k value (val_len bytes)
//!      payload_crc32 (4 bytes, little-endian)
//!      fill bytes (0xFF) up to the next multiple of program_granularity
//! ```

use crate::crc;

pub const HEADER_SIZE: u32 = 4;
pub const PAYLOAD_CRC_SIZE: u32 = 4;
pub const WRAP_COUNTER_SIZE: u32 = 4;

/// Rounds `n` up to the next multiple of `align`, a power of two.
pub fn round_up(n: u32, align: u32) -> u32 {
    (n + align - 1) & !(align - 1)
}

/// Total on-disk footprint of an entry with the given key/value lengths.
pub fn entry_size(key_len: u8, val_len: u16, program_granularity: u32) -> u32 {
    round_up(
        HEADER_SIZE + key_len as u32 + val_len as u32 + PAYLOAD_CRC_SIZE,
        program_granularity,
    )
}

/// Encodes the 4-byte header: the low 3 bytes hold `key_len | val_len << 8`,
/// the top byte holds the CRC-8 of those 3 bytes.
pub fn encode_header(key_len: u8, val_len: u16) -> [u8; 4] {
    let mut buf = [0u8; 4];
    buf[0] = key_len;
    buf[1..3].copy_from_slice(&val_len.to_le_bytes());
    buf[3] = crc::crc8(0, &buf[0..3]);
    buf
}

/// Decodes a 4-byte header, verifying its CRC-8. `None` means there is no
/// more live data here, not a backend error.
pub fn decode_header(buf: &[u8; 4]) -> Option<(u8, u16)> {
    let expected = crc::crc8(0, &buf[0..3]);
    if expected != buf[3] {
        return None;
    }
    let key_len = buf[0];
    let val_len = u16::from_le_bytes([buf[1], buf[2]]);
    Some((key_len, val_len))
}

/// A decoded entry location within the store: offset, extent, and header
/// fields. Entries are value objects; reading their payload goes through
/// the owning store, since backend access needs `&mut self`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub start: u32,
    pub next: u32,
    pub key_len: u8,
    pub val_len: u16,
}

impl Entry {
    pub fn is_block_header(&self) -> bool {
        self.key_len == 0
    }

    pub fn is_tombstone(&self) -> bool {
        self.key_len != 0 && self.val_len == 0
    }

    pub fn key_offset(&self) -> u32 {
        self.start + HEADER_SIZE
    }

    pub fn value_offset(&self) -> u32 {
        self.key_offset() + self.key_len as u32
    }

    pub fn crc_offset(&self) -> u32 {
        self.value_offset() + self.val_len as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let buf = encode_header(4, 300);
        assert_eq!(decode_header(&buf), Some((4, 300)));
    }

    #[test]
    fn corrupted_header_fails_crc() {
        let mut buf = encode_header(4, 300);
        buf[0] ^= 0x01;
        assert_eq!(decode_header(&buf), None);
    }

    #[test]
    fn entry_size_rounds_to_granularity() {
        // 4 (hdr) + 3 (key) + 0 (val) + 4 (crc) = 11, rounded to 1 -> 11
        assert_eq!(entry_size(3, 0, 1), 11);
        // rounded to 8 -> 16
        assert_eq!(entry_size(3, 0, 8), 16);
    }

    #[test]
    fn round_up_is_identity_on_aligned_input() {
        assert_eq!(round_up(16, 8), 16);
        assert_eq!(round_up(17, 8), 24);
    }
}
