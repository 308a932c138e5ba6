pub mod bitmap;
pub mod block;
pub mod cache;
pub mod control;
pub mod correction;
pub mod cycle;
pub mod decoder;
pub mod errors;
pub mod events;
pub mod finalize;
pub mod fragment;
pub mod params;
pub mod queue;
pub mod service;

pub use bitmap::CompletionBitmap;
pub use block::{AssembleError, Block};
pub use cache::{CACHE_MANIFEST_VERSION, CacheFile, CacheManifest, LoadedManifestSource};
pub use control::{ControlError, ControlMessage};
pub use correction::{CorrectionController, CorrectionDecision};
pub use decoder::{Decoder, DecoderConfig, DecoderState, FragmentOutcome};
pub use errors::{CacheError, FinalizeError, ParamsError, TransferError};
pub use events::{DecoderEvent, EventSink};
pub use finalize::{FinalizeReport, SystematicDecoder, UnitDecoder};
pub use fragment::{FRAGMENT_HEADER_LEN, Fragment, FragmentError, split_block};
pub use params::DecodeParams;
pub use queue::{DatagramQueue, DatagramSender, datagram_queue};
pub use service::{
    TransferCommand, TransferServiceConfig, TransferServiceHandle, TransferStatus, start_service,
    start_service_with_decoder,
};
