//! Validated store configuration.

use crate::allocator::Geometry;

/// Region geometry and the user cookie persisted into every block header.
///
/// Construction is a plain value with no lifetime beyond the caller that
/// built it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub block_size: u32,
    pub block_count: u32,
    pub spare_count: u32,
    pub program_granularity: u32,
    pub cookie: Vec<u8>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("block_size must be a power of two, got {0}")]
    BlockSizeNotPowerOfTwo(u32),
    #[error("program_granularity must be a power of two, got {0}")]
    GranularityNotPowerOfTwo(u32),
    #[error("program_granularity ({granularity}) must not exceed block_size ({block_size})")]
    GranularityExceedsBlockSize { granularity: u32, block_size: u32 },
    #[error("spare_count must be at least 1")]
    NoSpareBlocks,
    #[error("block_count ({block_count}) must be greater than spare_count ({spare_count})")]
    NotEnoughBlocks { block_count: u32, spare_count: u32 },
    #[error("cookie length {0} leaves no room for the block header's wrap counter in a u16 value length")]
    CookieTooLarge(usize),
}

fn is_power_of_two(n: u32) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

impl StoreConfig {
    pub fn validate(&self) -> Result<Geometry, ConfigError> {
        if !is_power_of_two(self.block_size) {
            return Err(ConfigError::BlockSizeNotPowerOfTwo(self.block_size));
        }
        if !is_power_of_two(self.program_granularity) {
            return Err(ConfigError::GranularityNotPowerOfTwo(self.program_granularity));
        }
        if self.program_granularity > self.block_size {
            return Err(ConfigError::GranularityExceedsBlockSize {
                granularity: self.program_granularity,
                block_size: self.block_size,
            });
        }
        if self.spare_count < 1 {
            return Err(ConfigError::NoSpareBlocks);
        }
        if self.block_count <= self.spare_count {
            return Err(ConfigError::NotEnoughBlocks {
                block_count: self.block_count,
                spare_count: self.spare_count,
            });
        }
        if self.cookie.len() > (u16::MAX as usize) - crate::entry::WRAP_COUNTER_SIZE as usize {
            return Err(ConfigError::CookieTooLarge(self.cookie.len()));
        }

        Ok(Geometry {
            block_size: self.block_size,
            block_count: self.block_count,
            spare_count: self.spare_count,
            program_granularity: self.program_granularity,
        })
    }
}
