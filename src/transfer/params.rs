use crate::transfer::errors::ParamsError;
use serde::{Deserialize, Serialize};

/// Transfer geometry announced by the sender. Immutable for the lifetime of one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeParams {
    /// Bytes of block payload carried by one full fragment.
    pub fragment_size: u32,
    pub block_data_size: u32,
    pub block_coeff_size: u32,
    pub blocks_per_cycle: u32,
    pub total_blocks: u64,
    pub total_cycles: u32,
    pub raw_file_length: u64,
}

impl DecodeParams {
    pub fn is_ready(&self) -> bool {
        self.blocks_per_cycle != 0 && self.total_blocks != 0 && self.total_cycles != 0
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.is_ready() {
            return Err(ParamsError::NotReady);
        }
        if self.fragment_size == 0 {
            return Err(ParamsError::ZeroFragmentSize);
        }
        if self.unit_size() == 0 {
            return Err(ParamsError::ZeroUnitSize);
        }
        let capacity = self.total_blocks.saturating_mul(u64::from(self.block_data_size));
        if self.raw_file_length > capacity {
            return Err(ParamsError::RawLengthExceedsCapacity {
                raw_file_length: self.raw_file_length,
                capacity,
            });
        }
        let cycles_needed = self.total_blocks.div_ceil(u64::from(self.blocks_per_cycle));
        if cycles_needed != u64::from(self.total_cycles) {
            return Err(ParamsError::CycleCountMismatch {
                total_cycles: self.total_cycles,
                expected: cycles_needed,
            });
        }
        Ok(())
    }

    /// Size of one block on disk and in memory: coefficient region followed by data region.
    pub fn unit_size(&self) -> usize {
        self.block_coeff_size as usize + self.block_data_size as usize
    }

    /// Off-cycle fragments tolerated before a correction is requested: the fragments of
    /// one block's data region, plus one.
    pub fn default_wrong_fragments_limit(&self) -> u32 {
        if self.fragment_size == 0 {
            return 1;
        }
        self.block_data_size.div_ceil(self.fragment_size) + 1
    }

    /// Slots the sender transmits in `cycle`; only the last cycle may be short.
    pub fn blocks_in_cycle(&self, cycle: u32) -> u32 {
        if self.blocks_per_cycle == 0 || cycle >= self.total_cycles {
            return 0;
        }
        let remainder = (self.total_blocks % u64::from(self.blocks_per_cycle)) as u32;
        if cycle + 1 < self.total_cycles || remainder == 0 {
            self.blocks_per_cycle
        } else {
            remainder
        }
    }

    pub fn serial_number(&self, cycle: u32, slot: u32) -> u64 {
        u64::from(self.blocks_per_cycle) * u64::from(cycle) + u64::from(slot)
    }

    /// Cycle that carries the block with the given serial number.
    pub fn owner_cycle(&self, sn: u64) -> u32 {
        if self.blocks_per_cycle == 0 {
            return 0;
        }
        (sn / u64::from(self.blocks_per_cycle)) as u32
    }

    pub fn cache_offset(&self, sn: u64) -> u64 {
        self.unit_size() as u64 * sn
    }
}

#[cfg(test)]
pub(crate) fn sample_params() -> DecodeParams {
    DecodeParams {
        fragment_size: 100,
        block_data_size: 250,
        block_coeff_size: 10,
        blocks_per_cycle: 4,
        total_blocks: 10,
        total_cycles: 3,
        raw_file_length: 2500,
    }
}
