use crate::transfer::decoder::{Decoder, DecoderConfig, DecoderState, FragmentOutcome};
use crate::transfer::errors::TransferError;
use crate::transfer::events::{DecoderEvent, EventSink};
use crate::transfer::finalize::{SystematicDecoder, UnitDecoder};
use crate::transfer::params::DecodeParams;
use crate::transfer::queue::{DatagramQueue, DatagramSender, datagram_queue};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};

pub type Result<T> = std::result::Result<T, TransferError>;

#[derive(Debug, Clone)]
pub struct TransferServiceConfig {
    pub decoder: DecoderConfig,
    /// Applied before the first datagram is processed when set.
    pub initial_params: Option<DecodeParams>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    pub running: bool,
    pub state: DecoderState,
    pub confirmed_blocks: u64,
    pub total_blocks: u64,
    pub progress_percent: u8,
    pub wrong_fragments: u32,
    pub correction_attempts: u32,
    pub started_at: Instant,
}

#[derive(Debug)]
pub enum TransferCommand {
    ResetParameters {
        params: DecodeParams,
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<TransferStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone)]
pub struct TransferServiceHandle {
    tx: mpsc::Sender<TransferCommand>,
    datagrams: DatagramSender,
}

impl TransferServiceHandle {
    /// Producer side of the inbound queue, for the network receive task.
    pub fn datagram_sender(&self) -> DatagramSender {
        self.datagrams.clone()
    }

    pub fn offer(&self, datagram: Vec<u8>) -> bool {
        self.datagrams.offer(datagram)
    }

    pub async fn reset_parameters(&self, params: DecodeParams) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransferCommand::ResetParameters { params, reply: tx })
            .await
            .map_err(|_| TransferError::ChannelClosed)?;
        rx.await.map_err(|_| TransferError::ChannelClosed)?
    }

    pub async fn status(&self) -> Result<TransferStatus> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransferCommand::Status { reply: tx })
            .await
            .map_err(|_| TransferError::ChannelClosed)?;
        rx.await.map_err(|_| TransferError::ChannelClosed)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransferCommand::Shutdown { reply: tx })
            .await
            .map_err(|_| TransferError::ChannelClosed)?;
        rx.await.map_err(|_| TransferError::ChannelClosed)?;
        Ok(())
    }
}

pub type StartedService = (
    TransferServiceHandle,
    watch::Receiver<TransferStatus>,
    mpsc::UnboundedReceiver<DecoderEvent>,
    tokio::task::JoinHandle<Result<()>>,
);

pub async fn start_service(cfg: TransferServiceConfig) -> Result<StartedService> {
    start_service_with_decoder(cfg, Box::new(SystematicDecoder)).await
}

pub async fn start_service_with_decoder(
    cfg: TransferServiceConfig,
    unit_decoder: Box<dyn UnitDecoder>,
) -> Result<StartedService> {
    let (sink, events_rx) = EventSink::channel();
    let mut decoder = Decoder::with_unit_decoder(cfg.decoder, sink, unit_decoder);
    if let Some(params) = cfg.initial_params {
        decoder.reset_parameters(params).await?;
    }

    let (datagrams, queue) = datagram_queue();
    let (tx, rx) = mpsc::channel(32);
    let started_at = Instant::now();
    let (status_tx, status_rx) = watch::channel(snapshot(&decoder, true, started_at));
    let join = tokio::spawn(run_service(decoder, queue, rx, status_tx, started_at));
    Ok((TransferServiceHandle { tx, datagrams }, status_rx, events_rx, join))
}

fn snapshot(decoder: &Decoder, running: bool, started_at: Instant) -> TransferStatus {
    TransferStatus {
        running,
        state: decoder.state(),
        confirmed_blocks: decoder.bitmap().confirmed(),
        total_blocks: decoder.bitmap().len(),
        progress_percent: decoder.bitmap().progress_percent(),
        wrong_fragments: decoder.correction().wrong_fragments(),
        correction_attempts: decoder.correction().attempts(),
        started_at,
    }
}

fn publish(
    status_tx: &watch::Sender<TransferStatus>,
    decoder: &Decoder,
    running: bool,
    started_at: Instant,
) {
    let next = snapshot(decoder, running, started_at);
    status_tx.send_if_modified(|cur| {
        if *cur == next {
            return false;
        }
        *cur = next;
        true
    });
}

async fn run_service(
    mut decoder: Decoder,
    mut queue: DatagramQueue,
    mut rx: mpsc::Receiver<TransferCommand>,
    status_tx: watch::Sender<TransferStatus>,
    started_at: Instant,
) -> Result<()> {
    tracing::info!(state = ?decoder.state(), "transfer service started");
    loop {
        tokio::select! {
            biased;

            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    TransferCommand::ResetParameters { params, reply } => {
                        let dropped = queue.clear();
                        if dropped > 0 {
                            tracing::debug!(dropped, "discarded datagrams queued before reset");
                        }
                        let result = decoder.reset_parameters(params).await;
                        if let Err(err) = &result {
                            tracing::warn!(error = %err, "rejected decode parameters");
                        }
                        publish(&status_tx, &decoder, true, started_at);
                        let _ = reply.send(result);
                    }
                    TransferCommand::Status { reply } => {
                        let _ = reply.send(snapshot(&decoder, true, started_at));
                    }
                    TransferCommand::Shutdown { reply } => {
                        let _ = reply.send(());
                        break;
                    }
                }
            }

            raw = queue.dequeue() => {
                let Some(raw) = raw else { break };
                match decoder.process_fragment(&raw).await {
                    Ok(FragmentOutcome::Finalized(report)) => {
                        let dropped = queue.clear();
                        tracing::info!(
                            bytes = report.bytes_written,
                            output = %report.output.display(),
                            dropped,
                            "transfer complete"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "failed to process fragment"),
                }
                publish(&status_tx, &decoder, true, started_at);
            }
        }
    }

    publish(&status_tx, &decoder, false, started_at);
    tracing::info!("transfer service stopped");
    Ok(())
}
