use crate::transfer::fragment::Fragment;

/// Half-open byte range `[start, end)` within a block buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug)]
pub enum AssembleError {
    WrongBlock {
        block: (u32, u32),
        fragment: (u32, u32),
    },
    OutOfBounds {
        end: u64,
        target_size: usize,
    },
}

impl std::fmt::Display for AssembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongBlock { block, fragment } => write!(
                f,
                "fragment for cycle {} block {} offered to cycle {} block {}",
                fragment.0, fragment.1, block.0, block.1
            ),
            Self::OutOfBounds { end, target_size } => write!(
                f,
                "fragment ends at {end}, past block target size {target_size}"
            ),
        }
    }
}

impl std::error::Error for AssembleError {}

/// Reassembly buffer for one block slot of the active cycle.
#[derive(Debug, Clone)]
pub struct Block {
    cycle: u32,
    slot: u32,
    data: Vec<u8>,
    filled: Vec<ByteRange>,
    complete: bool,
}

impl Block {
    pub fn new(cycle: u32, slot: u32, target_size: usize) -> Self {
        Self {
            cycle,
            slot,
            data: vec![0u8; target_size],
            filled: Vec::new(),
            complete: target_size == 0,
        }
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn target_size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn filled_bytes(&self) -> usize {
        self.filled.iter().map(ByteRange::len).sum()
    }

    /// Copies the fragment into place. Returns `true` only on the call that completes the block;
    /// fragments offered to an already complete block are ignored.
    pub fn assemble(&mut self, frag: &Fragment) -> Result<bool, AssembleError> {
        if self.complete {
            return Ok(false);
        }
        if frag.cycle != self.cycle || frag.block != self.slot {
            return Err(AssembleError::WrongBlock {
                block: (self.cycle, self.slot),
                fragment: (frag.cycle, frag.block),
            });
        }
        let end = frag.end();
        if end > self.data.len() as u64 {
            return Err(AssembleError::OutOfBounds {
                end,
                target_size: self.data.len(),
            });
        }

        let range = ByteRange {
            start: frag.offset as usize,
            end: end as usize,
        };
        self.data[range.start..range.end].copy_from_slice(&frag.payload);
        self.mark_filled(range);

        self.complete = self.filled.len() == 1
            && self.filled[0].start == 0
            && self.filled[0].end == self.data.len();
        Ok(self.complete)
    }

    // Keeps `filled` sorted and non-overlapping; touching ranges are merged.
    fn mark_filled(&mut self, range: ByteRange) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut out = Vec::with_capacity(self.filled.len() + 1);
        let mut placed = false;
        for r in self.filled.drain(..) {
            if r.end < merged.start {
                out.push(r);
            } else if merged.end < r.start {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(r);
            } else {
                merged.start = merged.start.min(r.start);
                merged.end = merged.end.max(r.end);
            }
        }
        if !placed {
            out.push(merged);
        }
        self.filled = out;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::fragment::split_block;

    fn frag(offset: u32, payload: Vec<u8>) -> Fragment {
        Fragment {
            cycle: 0,
            block: 1,
            offset,
            payload,
        }
    }

    #[test]
    fn completes_exactly_once_in_any_order() {
        let data: Vec<u8> = (0..260u32).map(|i| (i * 7) as u8).collect();
        let mut frags = split_block(0, 1, &data, 100);
        frags.reverse();

        let mut block = Block::new(0, 1, 260);
        let edges: Vec<bool> = frags
            .iter()
            .map(|f| block.assemble(f).expect("assemble"))
            .collect();
        assert_eq!(edges, vec![false, false, true]);
        assert!(block.is_complete());
        assert_eq!(block.data(), data.as_slice());

        assert!(!block.assemble(&frags[0]).expect("again"));
    }

    #[test]
    fn complete_block_ignores_later_fragments() {
        let mut block = Block::new(0, 1, 4);
        assert!(block.assemble(&frag(0, vec![1, 2, 3, 4])).expect("fill"));
        assert!(!block.assemble(&frag(0, vec![9, 9, 9, 9])).expect("late"));
        assert_eq!(block.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn one_missing_byte_keeps_block_incomplete() {
        let mut block = Block::new(0, 1, 10);
        block.assemble(&frag(0, vec![0; 4])).expect("a");
        block.assemble(&frag(5, vec![0; 5])).expect("b");
        assert!(!block.is_complete());
        assert_eq!(block.filled_bytes(), 9);
        assert!(block.assemble(&frag(4, vec![0; 1])).expect("gap"));
    }

    #[test]
    fn overlapping_fragments_merge_coverage() {
        let mut block = Block::new(0, 1, 10);
        block.assemble(&frag(2, vec![1; 5])).expect("a");
        block.assemble(&frag(0, vec![2; 4])).expect("b");
        assert_eq!(block.filled_bytes(), 7);
        assert!(block.assemble(&frag(6, vec![3; 4])).expect("c"));
        assert_eq!(block.data(), &[2, 2, 2, 2, 1, 1, 3, 3, 3, 3]);
    }

    #[test]
    fn out_of_bounds_fragment_is_rejected_without_side_effects() {
        let mut block = Block::new(0, 1, 8);
        let err = block
            .assemble(&frag(6, vec![1, 2, 3]))
            .expect_err("out of bounds");
        assert!(matches!(err, AssembleError::OutOfBounds { end: 9, .. }));
        assert_eq!(block.filled_bytes(), 0);
    }

    #[test]
    fn fragment_for_other_slot_is_rejected() {
        let mut block = Block::new(0, 2, 8);
        assert!(matches!(
            block.assemble(&frag(0, vec![1])),
            Err(AssembleError::WrongBlock { .. })
        ));
    }
}
