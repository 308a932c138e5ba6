use std::path::PathBuf;

#[derive(Debug)]
pub enum ParamsError {
    NotReady,
    ZeroFragmentSize,
    ZeroUnitSize,
    RawLengthExceedsCapacity { raw_file_length: u64, capacity: u64 },
    CycleCountMismatch { total_cycles: u32, expected: u64 },
}

impl std::fmt::Display for ParamsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(
                f,
                "decode parameters not ready: blocks per cycle, total blocks and total cycles must be non-zero"
            ),
            Self::ZeroFragmentSize => write!(f, "fragment size must be non-zero"),
            Self::ZeroUnitSize => write!(f, "block coefficient + data size must be non-zero"),
            Self::RawLengthExceedsCapacity {
                raw_file_length,
                capacity,
            } => write!(
                f,
                "raw file length {raw_file_length} exceeds data capacity {capacity} of all blocks"
            ),
            Self::CycleCountMismatch {
                total_cycles,
                expected,
            } => write!(
                f,
                "total cycles {total_cycles} does not match block geometry (expected {expected})"
            ),
        }
    }
}

impl std::error::Error for ParamsError {}

#[derive(Debug)]
pub enum CacheError {
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    Seek {
        path: PathBuf,
        offset: u64,
        source: std::io::Error,
    },
    Write {
        path: PathBuf,
        sn: u64,
        source: std::io::Error,
    },
    Sync {
        path: PathBuf,
        source: std::io::Error,
    },
    Reset {
        path: PathBuf,
        source: std::io::Error,
    },
    Manifest {
        path: PathBuf,
        source: std::io::Error,
    },
    ManifestSerialize {
        source: serde_json::Error,
    },
    ManifestParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "failed to open cache file '{}': {source}", path.display())
            }
            Self::Seek {
                path,
                offset,
                source,
            } => write!(
                f,
                "failed to seek cache file '{}' to {offset}: {source}",
                path.display()
            ),
            Self::Write { path, sn, source } => write!(
                f,
                "failed to write block {sn} to cache file '{}': {source}",
                path.display()
            ),
            Self::Sync { path, source } => {
                write!(f, "failed to sync cache file '{}': {source}", path.display())
            }
            Self::Reset { path, source } => {
                write!(f, "failed to reset cache file '{}': {source}", path.display())
            }
            Self::Manifest { path, source } => write!(
                f,
                "failed to access cache manifest '{}': {source}",
                path.display()
            ),
            Self::ManifestSerialize { source } => {
                write!(f, "failed to serialize cache manifest: {source}")
            }
            Self::ManifestParse { path, source } => write!(
                f,
                "failed to parse cache manifest '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. }
            | Self::Seek { source, .. }
            | Self::Write { source, .. }
            | Self::Sync { source, .. }
            | Self::Reset { source, .. }
            | Self::Manifest { source, .. } => Some(source),
            Self::ManifestSerialize { source } | Self::ManifestParse { source, .. } => {
                Some(source)
            }
        }
    }
}

#[derive(Debug)]
pub enum FinalizeError {
    Incomplete {
        first_missing: u64,
    },
    OpenCache {
        path: PathBuf,
        source: std::io::Error,
    },
    CreateOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    ShortRead {
        sn: u64,
        expected: usize,
        actual: usize,
    },
    ReadCache {
        sn: u64,
        source: std::io::Error,
    },
    Decode {
        sn: u64,
        reason: String,
    },
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    LengthMismatch {
        expected: u64,
        written: u64,
    },
}

impl std::fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete { first_missing } => {
                write!(f, "cannot finalize: block {first_missing} is still missing")
            }
            Self::OpenCache { path, source } => {
                write!(f, "failed to open cache file '{}': {source}", path.display())
            }
            Self::CreateOutput { path, source } => write!(
                f,
                "failed to create output file '{}': {source}",
                path.display()
            ),
            Self::ShortRead {
                sn,
                expected,
                actual,
            } => write!(
                f,
                "short read of unit {sn} from cache: expected {expected} bytes, got {actual}"
            ),
            Self::ReadCache { sn, source } => {
                write!(f, "failed to read unit {sn} from cache: {source}")
            }
            Self::Decode { sn, reason } => write!(f, "failed to decode unit {sn}: {reason}"),
            Self::WriteOutput { path, source } => write!(
                f,
                "failed to write output file '{}': {source}",
                path.display()
            ),
            Self::LengthMismatch { expected, written } => write!(
                f,
                "wrong raw file size: expected {expected} bytes, wrote {written}"
            ),
        }
    }
}

impl std::error::Error for FinalizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OpenCache { source, .. }
            | Self::CreateOutput { source, .. }
            | Self::ReadCache { source, .. }
            | Self::WriteOutput { source, .. } => Some(source),
            Self::Incomplete { .. }
            | Self::ShortRead { .. }
            | Self::Decode { .. }
            | Self::LengthMismatch { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum TransferError {
    Params(ParamsError),
    Cache(CacheError),
    Finalize(FinalizeError),
    /// A fragment arrived for the current cycle but no block set was built for it.
    CycleNotEntered {
        cycle: u32,
    },
    ChannelClosed,
    ServiceJoin(tokio::task::JoinError),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Params(source) => write!(f, "{source}"),
            Self::Cache(source) => write!(f, "{source}"),
            Self::Finalize(source) => write!(f, "{source}"),
            Self::CycleNotEntered { cycle } => {
                write!(f, "receive block set for cycle {cycle} is empty")
            }
            Self::ChannelClosed => write!(f, "transfer service channel closed"),
            Self::ServiceJoin(source) => write!(f, "transfer service task join error: {source}"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Params(source) => Some(source),
            Self::Cache(source) => Some(source),
            Self::Finalize(source) => Some(source),
            Self::ServiceJoin(source) => Some(source),
            Self::CycleNotEntered { .. } | Self::ChannelClosed => None,
        }
    }
}

impl From<ParamsError> for TransferError {
    fn from(value: ParamsError) -> Self {
        Self::Params(value)
    }
}

impl From<CacheError> for TransferError {
    fn from(value: CacheError) -> Self {
        Self::Cache(value)
    }
}

impl From<FinalizeError> for TransferError {
    fn from(value: FinalizeError) -> Self {
        Self::Finalize(value)
    }
}

impl From<tokio::task::JoinError> for TransferError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::ServiceJoin(value)
    }
}
