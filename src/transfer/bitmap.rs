// Transfer-wide record of which block serial numbers are safely in the cache file.
// Bits only ever go from unset to set until `reset` starts a new transfer.

#[derive(Debug, Clone, Default)]
pub struct CompletionBitmap {
    words: Vec<u64>,
    len: u64,
    confirmed: u64,
}

impl CompletionBitmap {
    pub fn new(len: u64) -> Self {
        let mut map = Self::default();
        map.reset(len);
        map
    }

    pub fn reset(&mut self, len: u64) {
        self.words = vec![0u64; len.div_ceil(64) as usize];
        self.len = len;
        self.confirmed = 0;
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }

    pub fn contains(&self, sn: u64) -> bool {
        if sn >= self.len {
            return false;
        }
        self.words[(sn >> 6) as usize] & (1u64 << (sn & 63)) != 0
    }

    /// Marks `sn` as confirmed. Returns `true` when the bit was newly set.
    pub fn mark(&mut self, sn: u64) -> bool {
        if sn >= self.len {
            return false;
        }
        let word = &mut self.words[(sn >> 6) as usize];
        let bit = 1u64 << (sn & 63);
        if *word & bit != 0 {
            return false;
        }
        *word |= bit;
        self.confirmed += 1;
        true
    }

    pub fn is_full(&self) -> bool {
        self.len > 0 && self.confirmed == self.len
    }

    pub fn first_missing(&self) -> Option<u64> {
        for (i, word) in self.words.iter().enumerate() {
            if *word == u64::MAX {
                continue;
            }
            let sn = (i as u64) * 64 + u64::from(word.trailing_ones());
            return (sn < self.len).then_some(sn);
        }
        None
    }

    /// Integer percentage of confirmed blocks; reaches 100 only when every block is confirmed.
    pub fn progress_percent(&self) -> u8 {
        if self.len == 0 {
            return 0;
        }
        (self.confirmed.saturating_mul(100) / self.len) as u8
    }

    pub fn iter_confirmed(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).filter(|sn| self.contains(*sn))
    }
}
