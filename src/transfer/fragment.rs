pub const FRAGMENT_HEADER_LEN: usize = 14;
pub const MAX_FRAGMENT_PAYLOAD: usize = u16::MAX as usize;

/// One datagram's worth of a block: `payload` belongs at `offset` within block `block` of
/// cycle `cycle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub cycle: u32,
    pub block: u32,
    pub offset: u32,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub enum FragmentError {
    Truncated { needed: usize, actual: usize },
    EmptyPayload,
    PayloadTooLarge { limit: usize, actual: usize },
}

impl std::fmt::Display for FragmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { needed, actual } => {
                write!(f, "truncated fragment: needed {needed} bytes, got {actual}")
            }
            Self::EmptyPayload => write!(f, "fragment carries no payload"),
            Self::PayloadTooLarge { limit, actual } => {
                write!(f, "fragment payload too large: {actual} > {limit}")
            }
        }
    }
}

impl std::error::Error for FragmentError {}

pub type Result<T> = std::result::Result<T, FragmentError>;

impl Fragment {
    /// Parses `cycle u32 | block u32 | offset u32 | len u16 | payload[len]`, little-endian.
    /// Bytes after the declared payload are ignored.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < FRAGMENT_HEADER_LEN {
            return Err(FragmentError::Truncated {
                needed: FRAGMENT_HEADER_LEN,
                actual: raw.len(),
            });
        }
        let cycle = read_u32_le(raw, 0)?;
        let block = read_u32_le(raw, 4)?;
        let offset = read_u32_le(raw, 8)?;
        let len = usize::from(read_u16_le(raw, 12)?);
        if len == 0 {
            return Err(FragmentError::EmptyPayload);
        }
        let payload = raw
            .get(FRAGMENT_HEADER_LEN..FRAGMENT_HEADER_LEN + len)
            .ok_or(FragmentError::Truncated {
                needed: FRAGMENT_HEADER_LEN + len,
                actual: raw.len(),
            })?;

        Ok(Self {
            cycle,
            block,
            offset,
            payload: payload.to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.payload.is_empty() {
            return Err(FragmentError::EmptyPayload);
        }
        if self.payload.len() > MAX_FRAGMENT_PAYLOAD {
            return Err(FragmentError::PayloadTooLarge {
                limit: MAX_FRAGMENT_PAYLOAD,
                actual: self.payload.len(),
            });
        }
        let mut out = Vec::with_capacity(FRAGMENT_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.cycle.to_le_bytes());
        out.extend_from_slice(&self.block.to_le_bytes());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Exclusive end of the byte range this fragment fills, widened so it cannot overflow.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + self.payload.len() as u64
    }
}

/// Splits one block buffer into fragments of at most `fragment_size` payload bytes.
pub fn split_block(cycle: u32, block: u32, data: &[u8], fragment_size: usize) -> Vec<Fragment> {
    let step = fragment_size.max(1).min(MAX_FRAGMENT_PAYLOAD);
    data.chunks(step)
        .enumerate()
        .map(|(i, chunk)| Fragment {
            cycle,
            block,
            offset: (i * step) as u32,
            payload: chunk.to_vec(),
        })
        .collect()
}

fn read_u32_le(raw: &[u8], offset: usize) -> Result<u32> {
    let slice = raw.get(offset..offset + 4).ok_or(FragmentError::Truncated {
        needed: offset + 4,
        actual: raw.len(),
    })?;
    let arr: [u8; 4] = slice.try_into().map_err(|_| FragmentError::Truncated {
        needed: offset + 4,
        actual: raw.len(),
    })?;
    Ok(u32::from_le_bytes(arr))
}

fn read_u16_le(raw: &[u8], offset: usize) -> Result<u16> {
    let slice = raw.get(offset..offset + 2).ok_or(FragmentError::Truncated {
        needed: offset + 2,
        actual: raw.len(),
    })?;
    let arr: [u8; 2] = slice.try_into().map_err(|_| FragmentError::Truncated {
        needed: offset + 2,
        actual: raw.len(),
    })?;
    Ok(u16::from_le_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_fragment(cycle: u32, block: u32, offset: u32, declared: u16, body: &[u8]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&cycle.to_le_bytes());
        raw.extend_from_slice(&block.to_le_bytes());
        raw.extend_from_slice(&offset.to_le_bytes());
        raw.extend_from_slice(&declared.to_le_bytes());
        raw.extend_from_slice(body);
        raw
    }

    #[test]
    fn parse_reads_header_fields_and_payload() {
        let raw = raw_fragment(2, 3, 100, 4, &[1, 2, 3, 4]);
        let frag = Fragment::parse(&raw).expect("parse");
        assert_eq!(frag.cycle, 2);
        assert_eq!(frag.block, 3);
        assert_eq!(frag.offset, 100);
        assert_eq!(frag.payload, vec![1, 2, 3, 4]);
        assert_eq!(frag.end(), 104);
    }

    #[test]
    fn parse_ignores_trailing_bytes() {
        let raw = raw_fragment(0, 0, 0, 2, &[9, 9, 0xFF, 0xFF]);
        let frag = Fragment::parse(&raw).expect("parse");
        assert_eq!(frag.payload, vec![9, 9]);
    }

    #[test]
    fn parse_rejects_short_header() {
        let err = Fragment::parse(&[0u8; 13]).expect_err("short header");
        assert!(matches!(
            err,
            FragmentError::Truncated {
                needed: FRAGMENT_HEADER_LEN,
                actual: 13
            }
        ));
    }

    #[test]
    fn parse_rejects_declared_length_beyond_datagram() {
        let raw = raw_fragment(0, 0, 0, 10, &[1, 2, 3]);
        let err = Fragment::parse(&raw).expect_err("overlong");
        assert!(matches!(err, FragmentError::Truncated { needed: 24, .. }));
    }

    #[test]
    fn parse_rejects_empty_payload() {
        let raw = raw_fragment(0, 0, 0, 0, &[]);
        assert!(matches!(
            Fragment::parse(&raw),
            Err(FragmentError::EmptyPayload)
        ));
    }

    #[test]
    fn encode_matches_wire_layout() {
        let frag = Fragment {
            cycle: 7,
            block: 1,
            offset: 200,
            payload: vec![0xAB; 3],
        };
        let encoded = frag.encode().expect("encode");
        assert_eq!(encoded, raw_fragment(7, 1, 200, 3, &[0xAB; 3]));
        assert_eq!(Fragment::parse(&encoded).expect("parse"), frag);
    }

    #[test]
    fn split_block_covers_buffer_with_short_tail() {
        let data: Vec<u8> = (0..260u32).map(|i| i as u8).collect();
        let frags = split_block(1, 2, &data, 100);
        assert_eq!(frags.len(), 3);
        assert_eq!(frags[2].offset, 200);
        assert_eq!(frags[2].payload.len(), 60);
        assert!(frags.iter().all(|f| f.cycle == 1 && f.block == 2));
    }
}
