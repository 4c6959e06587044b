//! Nibble-table CRC-8 and CRC-32 checksums.

// CRC-8, polynomial 0x07, no reflection, no XOR-out. Used for the 3-byte
// header word.
const CRC8_TABLE: [u8; 16] = [
    0x00, 0x07, 0x0e, 0x09, 0x1c, 0x1b, 0x12, 0x15, 0x38, 0x3f, 0x36, 0x31, 0x24, 0x23, 0x2a, 0x2d,
];

pub fn crc8(init: u8, buf: &[u8]) -> u8 {
    let mut crc = init;
    for &byte in buf {
        crc ^= byte;
        crc = (crc << 4) ^ CRC8_TABLE[(crc >> 4) as usize];
        crc = (crc << 4) ^ CRC8_TABLE[(crc >> 4) as usize];
    }
    crc
}

// CRC-32, reflected polynomial 0xedb88320, nibble-at-a-time, final
// complement (zlib/ISO-HDLC).
const CRC32_TABLE: [u32; 16] = [
    0x00000000, 0x1db71064, 0x3b6e20c8, 0x26d930ac, 0x76dc4190, 0x6b6b51f4, 0x4db26158, 0x5005713c,
    0xedb88320, 0xf00f9344, 0xd6d6a3e8, 0xcb61b38c, 0x9b64c2b0, 0x86d3d2d4, 0xa00ae278, 0xbdbdf21c,
];

/// Streaming CRC-32 accumulator, so callers can feed it key, value and
/// cookie bytes incrementally without buffering the whole payload.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    reg: u32,
}

impl Crc32 {
    pub fn new() -> Self {
        Crc32 { reg: 0 }
    }

    pub fn update(&mut self, buf: &[u8]) {
        let mut crc = !self.reg;
        for &byte in buf {
            crc = (crc >> 4) ^ CRC32_TABLE[((crc ^ (byte as u32)) & 0x0f) as usize];
            crc = (crc >> 4) ^ CRC32_TABLE[((crc ^ ((byte >> 4) as u32)) & 0x0f) as usize];
        }
        self.reg = !crc;
    }

    pub fn finalize(self) -> u32 {
        self.reg
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot helper equivalent to `Crc32::new().update(buf).finalize()`.
pub fn crc32(buf: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(buf);
    hasher.finalize()
}
