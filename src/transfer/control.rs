use crate::transfer::events::DecoderEvent;

pub const OP_NEED_NEXT_CYCLE: u8 = 0x01;
pub const OP_CHANGE_CYCLE: u8 = 0x02;
pub const OP_PROGRESS: u8 = 0x03;
pub const OP_FULL_FILE_SAVED: u8 = 0x04;

/// Control datagram sent back to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    NeedNextCycle,
    ChangeCycle { cycle: u32 },
    Progress { percent: u8 },
    FullFileSaved,
}

#[derive(Debug)]
pub enum ControlError {
    Empty,
    UnknownOpcode(u8),
    InvalidLength {
        opcode: u8,
        expected: usize,
        actual: usize,
    },
    InvalidPercent(u8),
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty control datagram"),
            Self::UnknownOpcode(op) => write!(f, "unknown control opcode 0x{op:02x}"),
            Self::InvalidLength {
                opcode,
                expected,
                actual,
            } => write!(
                f,
                "invalid length for control opcode 0x{opcode:02x}: expected {expected}, got {actual}"
            ),
            Self::InvalidPercent(p) => write!(f, "progress percent out of range: {p}"),
        }
    }
}

impl std::error::Error for ControlError {}

pub type Result<T> = std::result::Result<T, ControlError>;

impl ControlMessage {
    /// Events that have a wire form; local diagnostics map to `None`.
    pub fn from_event(event: &DecoderEvent) -> Option<Self> {
        match event {
            DecoderEvent::NeedNextCycle => Some(Self::NeedNextCycle),
            DecoderEvent::CorrectionTo { cycle } => Some(Self::ChangeCycle { cycle: *cycle }),
            DecoderEvent::Progress { percent } => Some(Self::Progress { percent: *percent }),
            DecoderEvent::FullFileSaved => Some(Self::FullFileSaved),
            DecoderEvent::BlockAcquired { .. } | DecoderEvent::CorrectionStalled { .. } => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::NeedNextCycle => vec![OP_NEED_NEXT_CYCLE],
            Self::ChangeCycle { cycle } => {
                let mut out = Vec::with_capacity(5);
                out.push(OP_CHANGE_CYCLE);
                out.extend_from_slice(&cycle.to_le_bytes());
                out
            }
            Self::Progress { percent } => vec![OP_PROGRESS, *percent],
            Self::FullFileSaved => vec![OP_FULL_FILE_SAVED],
        }
    }

    pub fn decode(raw: &[u8]) -> Result<Self> {
        let (&opcode, body) = raw.split_first().ok_or(ControlError::Empty)?;
        let expect_len = |expected: usize| {
            if body.len() == expected {
                Ok(())
            } else {
                Err(ControlError::InvalidLength {
                    opcode,
                    expected: expected + 1,
                    actual: raw.len(),
                })
            }
        };
        match opcode {
            OP_NEED_NEXT_CYCLE => {
                expect_len(0)?;
                Ok(Self::NeedNextCycle)
            }
            OP_CHANGE_CYCLE => {
                expect_len(4)?;
                let arr: [u8; 4] = body.try_into().map_err(|_| ControlError::InvalidLength {
                    opcode,
                    expected: 5,
                    actual: raw.len(),
                })?;
                Ok(Self::ChangeCycle {
                    cycle: u32::from_le_bytes(arr),
                })
            }
            OP_PROGRESS => {
                expect_len(1)?;
                let percent = body[0];
                if percent > 100 {
                    return Err(ControlError::InvalidPercent(percent));
                }
                Ok(Self::Progress { percent })
            }
            OP_FULL_FILE_SAVED => {
                expect_len(0)?;
                Ok(Self::FullFileSaved)
            }
            other => Err(ControlError::UnknownOpcode(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_cycle_layout() {
        let raw = ControlMessage::ChangeCycle { cycle: 0x0102_0304 }.encode();
        assert_eq!(raw, vec![OP_CHANGE_CYCLE, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(
            ControlMessage::decode(&raw).expect("decode"),
            ControlMessage::ChangeCycle { cycle: 0x0102_0304 }
        );
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert!(matches!(ControlMessage::decode(&[]), Err(ControlError::Empty)));
        assert!(matches!(
            ControlMessage::decode(&[0x7F]),
            Err(ControlError::UnknownOpcode(0x7F))
        ));
        assert!(matches!(
            ControlMessage::decode(&[OP_CHANGE_CYCLE, 1, 2]),
            Err(ControlError::InvalidLength { expected: 5, .. })
        ));
        assert!(matches!(
            ControlMessage::decode(&[OP_NEED_NEXT_CYCLE, 0]),
            Err(ControlError::InvalidLength { .. })
        ));
        assert!(matches!(
            ControlMessage::decode(&[OP_PROGRESS, 101]),
            Err(ControlError::InvalidPercent(101))
        ));
    }

    #[test]
    fn local_events_have_no_wire_form() {
        assert_eq!(
            ControlMessage::from_event(&DecoderEvent::BlockAcquired { sn: 3 }),
            None
        );
        assert_eq!(
            ControlMessage::from_event(&DecoderEvent::CorrectionTo { cycle: 2 }),
            Some(ControlMessage::ChangeCycle { cycle: 2 })
        );
    }
}
