use crate::transfer::bitmap::CompletionBitmap;
use crate::transfer::cache::CacheFile;
use crate::transfer::correction::{
    CorrectionController, CorrectionDecision, DEFAULT_CORRECTION_RETRY_CEILING,
};
use crate::transfer::cycle::CycleBlocks;
use crate::transfer::errors::{FinalizeError, TransferError};
use crate::transfer::events::{DecoderEvent, EventSink};
use crate::transfer::finalize::{self, FinalizeReport, SystematicDecoder, UnitDecoder};
use crate::transfer::fragment::Fragment;
use crate::transfer::params::DecodeParams;
use crate::transfer::queue::DatagramQueue;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub cache_path: PathBuf,
    pub output_path: PathBuf,
    /// `None` derives the limit from the block geometry.
    pub wrong_fragments_limit: Option<u32>,
    pub correction_retry_ceiling: u32,
    /// Reload a matching cache manifest instead of starting from an empty cache.
    pub resume: bool,
    pub sync_writes: bool,
}

impl DecoderConfig {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cache_path: dir.join("rcv.cache"),
            output_path: dir.join("rcv.cache.raw"),
            wrong_fragments_limit: None,
            correction_retry_ceiling: DEFAULT_CORRECTION_RETRY_CEILING,
            resume: false,
            sync_writes: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Uninitialized,
    Ready { cycle: u32 },
    Finalized,
}

/// What became of one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    Dropped,
    OffCycle { cycle: u32 },
    Assembled,
    BlockCompleted { sn: u64 },
    CycleCompleted { cycle: u32, next_cycle: u32 },
    Finalized(FinalizeReport),
}

pub struct Decoder {
    cfg: DecoderConfig,
    params: DecodeParams,
    state: DecoderState,
    blocks: CycleBlocks,
    bitmap: CompletionBitmap,
    correction: CorrectionController,
    cache: CacheFile,
    unit_decoder: Box<dyn UnitDecoder>,
    events: EventSink,
    // Set when the last completion pass failed part-way; the next in-cycle fragment reruns it.
    completion_pending: bool,
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("state", &self.state)
            .field("params", &self.params)
            .field("confirmed", &self.bitmap.confirmed())
            .finish_non_exhaustive()
    }
}

impl Decoder {
    pub fn new(cfg: DecoderConfig, events: EventSink) -> Self {
        Self::with_unit_decoder(cfg, events, Box::new(SystematicDecoder))
    }

    pub fn with_unit_decoder(
        cfg: DecoderConfig,
        events: EventSink,
        unit_decoder: Box<dyn UnitDecoder>,
    ) -> Self {
        let cache = CacheFile::new(cfg.cache_path.clone()).with_sync_writes(cfg.sync_writes);
        let correction = CorrectionController::new(1, cfg.correction_retry_ceiling);
        Self {
            cfg,
            params: DecodeParams::default(),
            state: DecoderState::Uninitialized,
            blocks: CycleBlocks::default(),
            bitmap: CompletionBitmap::default(),
            correction,
            cache,
            unit_decoder,
            events,
            completion_pending: false,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn params(&self) -> &DecodeParams {
        &self.params
    }

    pub fn bitmap(&self) -> &CompletionBitmap {
        &self.bitmap
    }

    pub fn correction(&self) -> &CorrectionController {
        &self.correction
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.cfg
    }

    pub fn current_cycle(&self) -> Option<u32> {
        match self.state {
            DecoderState::Ready { cycle } => Some(cycle),
            DecoderState::Uninitialized | DecoderState::Finalized => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, DecoderState::Ready { .. })
    }

    /// Starts a new transfer: all tracking state is cleared and cycle 0 is entered, or with
    /// `resume` the first cycle still missing a block.
    pub async fn reset_parameters(&mut self, params: DecodeParams) -> Result<()> {
        tracing::info!(?params, "resetting decode parameters");
        params.validate()?;

        self.params = params;
        self.state = DecoderState::Uninitialized;
        self.completion_pending = false;
        let limit = self
            .cfg
            .wrong_fragments_limit
            .unwrap_or_else(|| params.default_wrong_fragments_limit());
        self.correction = CorrectionController::new(limit, self.cfg.correction_retry_ceiling);
        self.bitmap.reset(params.total_blocks);
        self.blocks.clear();

        let restored = if self.cfg.resume {
            self.cache.restore(&params, &mut self.bitmap).await
        } else {
            None
        };
        if restored.is_none() {
            self.bitmap.reset(params.total_blocks);
            self.cache.reset().await?;
        }

        let start = self
            .bitmap
            .first_missing()
            .map(|sn| params.owner_cycle(sn))
            .unwrap_or(0);
        self.state = DecoderState::Ready { cycle: start };
        if !self.blocks.enter(&self.params, start) {
            tracing::error!(cycle = start, "failed to enter start cycle");
        }
        tracing::info!(
            cycle = start,
            wrong_fragments_limit = limit,
            confirmed = self.bitmap.confirmed(),
            "decoder ready"
        );

        if self.bitmap.is_full() {
            self.finalize().await?;
        }
        Ok(())
    }

    /// Moves the receiver to `cycle`, discarding any partially assembled blocks.
    /// Cycles beyond the sender's declared range are refused.
    pub fn advance_to(&mut self, cycle: u32) -> bool {
        if !self.is_ready() || cycle >= self.params.total_cycles {
            return false;
        }
        self.state = DecoderState::Ready { cycle };
        self.blocks.enter(&self.params, cycle)
    }

    /// Drains whatever is queued right now without waiting for more.
    /// Returns the number of datagrams processed.
    pub async fn process_queue(&mut self, queue: &mut DatagramQueue) -> usize {
        if !self.is_ready() {
            tracing::warn!(state = ?self.state, "decoder not ready; leaving queue untouched");
            return 0;
        }
        let mut processed = 0;
        while let Some(raw) = queue.try_dequeue() {
            processed += 1;
            match self.process_fragment(&raw).await {
                Ok(FragmentOutcome::Finalized(_)) => {
                    let dropped = queue.clear();
                    tracing::debug!(dropped, "cleared inbound queue after finalize");
                    break;
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "failed to process fragment"),
            }
        }
        processed
    }

    pub async fn process_fragment(&mut self, raw: &[u8]) -> Result<FragmentOutcome> {
        let DecoderState::Ready { cycle: current } = self.state else {
            return Ok(FragmentOutcome::Dropped);
        };
        let frag = match Fragment::parse(raw) {
            Ok(frag) => frag,
            Err(err) => {
                tracing::trace!(error = %err, len = raw.len(), "dropping malformed datagram");
                return Ok(FragmentOutcome::Dropped);
            }
        };

        if frag.cycle != current {
            self.correction.record_wrong_fragment();
            tracing::trace!(
                frag_cycle = frag.cycle,
                current,
                wrong = self.correction.wrong_fragments(),
                "off-cycle fragment"
            );
            self.correct_cycle_to(current);
            return Ok(FragmentOutcome::OffCycle { cycle: frag.cycle });
        }
        self.correction.on_in_sync();

        if self.blocks.is_empty() {
            tracing::error!(cycle = current, "receive block set is empty");
            return Err(TransferError::CycleNotEntered { cycle: current });
        }
        let Some(block) = self.blocks.get_mut(frag.block) else {
            if crate::logging::warn_throttled("fragment_slot_out_of_range", Duration::from_secs(10))
            {
                tracing::warn!(
                    cycle = current,
                    slot = frag.block,
                    blocks = self.blocks.len(),
                    "fragment addresses a block slot outside the cycle"
                );
            }
            return Ok(FragmentOutcome::Dropped);
        };

        let completed = match block.assemble(&frag) {
            Ok(completed) => completed,
            Err(err) => {
                if crate::logging::warn_throttled("fragment_out_of_bounds", Duration::from_secs(10))
                {
                    tracing::warn!(cycle = current, slot = frag.block, error = %err, "dropping fragment");
                }
                return Ok(FragmentOutcome::Dropped);
            }
        };

        let mut outcome = FragmentOutcome::Assembled;
        if completed {
            let sn = self.params.serial_number(current, frag.block);
            tracing::debug!(sn, cycle = current, slot = frag.block, "block assembled");
            self.events.emit(DecoderEvent::BlockAcquired { sn });
            outcome = FragmentOutcome::BlockCompleted { sn };
        }

        if (completed || self.completion_pending) && self.blocks.is_complete(&self.params) {
            return self.on_cycle_complete(current).await;
        }
        Ok(outcome)
    }

    async fn on_cycle_complete(&mut self, cycle: u32) -> Result<FragmentOutcome> {
        tracing::info!(cycle, "got all blocks of current cycle");
        self.completion_pending = true;

        let saved = self
            .cache
            .save_cycle_blocks(&self.params, self.blocks.blocks(), &mut self.bitmap, &self.events)
            .await;
        if self.cfg.resume
            && let Err(err) = self.cache.save_manifest(&self.params, &self.bitmap).await
        {
            tracing::warn!(error = %err, "failed to update cache manifest");
        }
        let summary = saved?;
        tracing::debug!(
            cycle,
            written = summary.written,
            skipped = summary.skipped,
            confirmed = self.bitmap.confirmed(),
            "cycle saved"
        );

        let Some(missing) = self.bitmap.first_missing() else {
            let report = self.finalize().await?;
            return Ok(FragmentOutcome::Finalized(report));
        };
        self.completion_pending = false;

        let owner = self.params.owner_cycle(missing);
        if owner > cycle {
            self.advance_to(owner);
            self.events.emit(DecoderEvent::NeedNextCycle);
        } else {
            tracing::info!(missing, owner, cycle, "gap behind current cycle; rewinding");
            self.advance_to(owner);
            self.correct_cycle_to(owner);
        }
        Ok(FragmentOutcome::CycleCompleted {
            cycle,
            next_cycle: owner,
        })
    }

    fn correct_cycle_to(&mut self, target: u32) {
        let Some(current) = self.current_cycle() else {
            return;
        };
        if let CorrectionDecision::Signal { cycle } =
            self.correction.correct_cycle_to(current, target)
        {
            tracing::debug!(cycle, attempts = self.correction.attempts(), "requesting cycle change");
            self.events.emit(DecoderEvent::CorrectionTo { cycle });
            if self.correction.is_stalled() {
                self.events.emit(DecoderEvent::CorrectionStalled {
                    cycle,
                    attempts: self.correction.attempts(),
                });
            }
        }
    }

    /// Rebuilds the raw output file from the cache. Only valid once every block is confirmed;
    /// a failure leaves the decoder live so the call can be repeated.
    pub async fn finalize(&mut self) -> Result<FinalizeReport> {
        if let Some(first_missing) = self.bitmap.first_missing() {
            return Err(FinalizeError::Incomplete { first_missing }.into());
        }
        if self.bitmap.is_empty() {
            return Err(FinalizeError::Incomplete { first_missing: 0 }.into());
        }

        let report = match finalize::finalize(
            &self.params,
            self.cache.path(),
            &self.cfg.output_path,
            self.unit_decoder.as_mut(),
        )
        .await
        {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "finalize failed");
                self.completion_pending = true;
                return Err(err.into());
            }
        };

        self.completion_pending = false;
        self.blocks.clear();
        self.state = DecoderState::Finalized;
        self.events.emit(DecoderEvent::FullFileSaved);
        Ok(report)
    }
}
