use crate::transfer::block::Block;
use crate::transfer::params::DecodeParams;

/// Block set of the cycle currently being received. Entering a cycle drops whatever was
/// partially assembled for the previous one.
#[derive(Debug, Default)]
pub struct CycleBlocks {
    cycle: u32,
    blocks: Vec<Block>,
}

impl CycleBlocks {
    /// Rebuilds the set for `cycle`. Returns `false` (leaving the set empty) when the cycle
    /// holds no blocks under `params`.
    pub fn enter(&mut self, params: &DecodeParams, cycle: u32) -> bool {
        self.blocks.clear();
        self.cycle = cycle;

        let count = params.blocks_in_cycle(cycle);
        if count == 0 {
            tracing::warn!(cycle, "block count in cycle is 0; no block set built");
            return false;
        }
        let unit = params.unit_size();
        self.blocks = (0..count).map(|slot| Block::new(cycle, slot, unit)).collect();
        tracing::debug!(cycle, blocks = count, unit, "entered receive cycle");
        true
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get_mut(&mut self, slot: u32) -> Option<&mut Block> {
        self.blocks.get_mut(slot as usize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn completed(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_complete()).count()
    }

    pub fn is_complete(&self, params: &DecodeParams) -> bool {
        let target = params.blocks_in_cycle(self.cycle) as usize;
        if self.blocks.len() != target {
            return false;
        }
        match self.blocks.iter().position(|b| !b.is_complete()) {
            Some(slot) => {
                tracing::trace!(
                    cycle = self.cycle,
                    slot,
                    filled = self.blocks[slot].filled_bytes(),
                    "cycle not complete"
                );
                false
            }
            None => true,
        }
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
