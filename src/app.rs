use crate::{
    config::Config,
    single_instance::DataDirLock,
    transfer::{
        ControlMessage, DatagramSender, DecoderEvent, TransferServiceConfig, start_service,
    },
};
use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::UdpSocket;

pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        log = %config.general.log_level,
        data_dir = %config.general.data_dir,
        "starting receiver"
    );

    let lock = DataDirLock::acquire(config.data_dir())?;
    tracing::debug!(lock = %lock.path().display(), "data dir locked");

    let bind_addr = config.bind_addr();
    let sock = Arc::new(
        UdpSocket::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind UDP receive socket on {bind_addr}"))?,
    );
    tracing::info!(local = %sock.local_addr()?, "listening for fragments");

    let control_dest = match config.sender_control_addr() {
        Some(addr) => Some(resolve_control_addr(addr).await?),
        None => {
            tracing::info!("no sender control address configured; control signals are only logged");
            None
        }
    };

    let initial_params = config.transfer.is_ready().then_some(config.transfer);
    if initial_params.is_none() {
        tracing::warn!("[transfer] parameters not set; fragments will be dropped until reset");
    }
    let (handle, status_rx, mut events, join) = start_service(TransferServiceConfig {
        decoder: config.decoder_config(),
        initial_params,
    })
    .await
    .context("failed to start transfer service")?;

    let pump = tokio::spawn(pump_datagrams(
        sock.clone(),
        handle.datagram_sender(),
        config.receiver.max_datagram_size,
    ));

    tracing::info!("press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received Ctrl+C");
                break;
            }

            event = events.recv() => {
                let Some(event) = event else {
                    tracing::warn!("transfer service event channel closed");
                    break;
                };
                log_event(&event);
                if let Some(dest) = control_dest {
                    send_control(&sock, dest, &event).await;
                }
                if event == DecoderEvent::FullFileSaved {
                    break;
                }
            }
        }
    }

    pump.abort();
    if let Err(err) = handle.shutdown().await {
        tracing::debug!(error = %err, "transfer service already stopped");
    }
    join.await.context("transfer service task panicked")??;

    let status = status_rx.borrow().clone();
    tracing::info!(
        state = ?status.state,
        confirmed = status.confirmed_blocks,
        total = status.total_blocks,
        progress = status.progress_percent,
        elapsed_secs = status.started_at.elapsed().as_secs(),
        "shutting down gracefully"
    );
    drop(lock);
    Ok(())
}

async fn resolve_control_addr(addr: &str) -> anyhow::Result<SocketAddr> {
    tokio::net::lookup_host(addr)
        .await
        .with_context(|| format!("failed to resolve sender control address {addr}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("sender control address {addr} resolved to nothing"))
}

/// Copies every received datagram into the inbound queue until the consumer goes away.
pub(crate) async fn pump_datagrams(sock: Arc<UdpSocket>, queue: DatagramSender, max_len: usize) {
    let mut buf = vec![0u8; max_len];
    loop {
        match sock.recv_from(&mut buf).await {
            Ok((n, _from)) => {
                if !queue.offer(buf[..n].to_vec()) {
                    tracing::debug!("inbound queue closed; stopping receive task");
                    break;
                }
            }
            Err(err) => {
                if crate::logging::warn_throttled("udp_recv_failed", Duration::from_secs(10)) {
                    tracing::warn!(error = %err, "UDP receive failed");
                }
            }
        }
    }
}

async fn send_control(sock: &UdpSocket, dest: SocketAddr, event: &DecoderEvent) {
    let Some(msg) = ControlMessage::from_event(event) else {
        return;
    };
    if let Err(err) = sock.send_to(&msg.encode(), dest).await {
        tracing::warn!(error = %err, %dest, ?msg, "failed to send control datagram");
    }
}

fn log_event(event: &DecoderEvent) {
    match event {
        DecoderEvent::BlockAcquired { sn } => tracing::debug!(sn, "block acquired"),
        DecoderEvent::Progress { percent } => tracing::info!(percent, "progress"),
        DecoderEvent::NeedNextCycle => tracing::info!("requesting next cycle"),
        DecoderEvent::CorrectionTo { cycle } => {
            tracing::info!(cycle, "requesting cycle correction")
        }
        DecoderEvent::CorrectionStalled { cycle, attempts } => {
            tracing::warn!(cycle, attempts, "cycle correction is not taking effect")
        }
        DecoderEvent::FullFileSaved => tracing::info!("full file saved"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::datagram_queue;

    #[tokio::test]
    async fn pump_forwards_datagrams_in_order() {
        let rx_sock = Arc::new(UdpSocket::bind("127.0.0.1:0").await.expect("bind rx"));
        let rx_addr = rx_sock.local_addr().expect("addr");
        let tx_sock = UdpSocket::bind("127.0.0.1:0").await.expect("bind tx");

        let (sender, mut queue) = datagram_queue();
        let pump = tokio::spawn(pump_datagrams(rx_sock, sender, 64));

        tx_sock.send_to(b"first", rx_addr).await.expect("send");
        tx_sock.send_to(b"second", rx_addr).await.expect("send");

        assert_eq!(queue.dequeue().await.expect("first"), b"first".to_vec());
        assert_eq!(queue.dequeue().await.expect("second"), b"second".to_vec());
        pump.abort();
    }

    #[tokio::test]
    async fn control_datagrams_only_for_wire_events() {
        let sock = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let peer = UdpSocket::bind("127.0.0.1:0").await.expect("bind peer");
        let dest = peer.local_addr().expect("addr");

        send_control(&sock, dest, &DecoderEvent::BlockAcquired { sn: 3 }).await;
        send_control(&sock, dest, &DecoderEvent::CorrectionTo { cycle: 2 }).await;

        let mut buf = [0u8; 16];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), peer.recv_from(&mut buf))
            .await
            .expect("timeout")
            .expect("recv");
        assert_eq!(
            ControlMessage::decode(&buf[..n]).expect("decode"),
            ControlMessage::ChangeCycle { cycle: 2 }
        );
    }
}
