use blockcast_rx::transfer::{
    ControlMessage, DecodeParams, DecoderConfig, DecoderEvent, DecoderState,
    TransferServiceConfig, TransferServiceHandle, split_block, start_service,
};
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::sync::mpsc;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    let id = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("{prefix}_{}_{}", std::process::id(), id))
}

fn params(raw_file_length: u64) -> DecodeParams {
    DecodeParams {
        fragment_size: 100,
        block_data_size: 250,
        block_coeff_size: 10,
        blocks_per_cycle: 4,
        total_blocks: 10,
        total_cycles: 3,
        raw_file_length,
    }
}

fn raw_file(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

// Coefficient region is filler; the receiver's systematic decoder discards it.
fn cycle_datagrams(p: &DecodeParams, raw: &[u8], cycle: u32) -> Vec<Vec<u8>> {
    let data = p.block_data_size as usize;
    let mut out = Vec::new();
    for slot in 0..p.blocks_in_cycle(cycle) {
        let sn = p.serial_number(cycle, slot) as usize;
        let mut unit = vec![0xEE; p.block_coeff_size as usize];
        unit.extend((sn * data..(sn + 1) * data).map(|i| raw.get(i).copied().unwrap_or(0)));
        for frag in split_block(cycle, slot, &unit, p.fragment_size as usize) {
            out.push(frag.encode().expect("encode"));
        }
    }
    out
}

fn offer_all(handle: &TransferServiceHandle, datagrams: impl IntoIterator<Item = Vec<u8>>) {
    for d in datagrams {
        assert!(handle.offer(d), "service stopped accepting datagrams");
    }
}

/// Waits for the next event that would go on the wire, collecting progress along the way.
async fn next_signal(
    events: &mut mpsc::UnboundedReceiver<DecoderEvent>,
    progress: &mut Vec<u8>,
) -> ControlMessage {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for decoder event")
            .expect("event channel closed");
        if let DecoderEvent::Progress { percent } = event {
            progress.push(percent);
            continue;
        }
        if let Some(msg) = ControlMessage::from_event(&event) {
            return msg;
        }
    }
}

fn service_config(root: &std::path::Path, p: DecodeParams, resume: bool) -> TransferServiceConfig {
    let mut decoder = DecoderConfig::in_dir(root);
    decoder.resume = resume;
    TransferServiceConfig {
        decoder,
        initial_params: Some(p),
    }
}

#[tokio::test]
async fn reactive_sender_delivers_whole_file() {
    let root = unique_temp_dir("blockcast_e2e_full");
    let p = params(2380);
    let raw = raw_file(2380);
    let (handle, status_rx, mut events, join) =
        start_service(service_config(&root, p, false)).await.expect("start");
    let mut progress = Vec::new();

    // Cycle 0 arrives back to front with a malformed datagram mixed in.
    let mut first = cycle_datagrams(&p, &raw, 0);
    first.reverse();
    first.insert(3, vec![0xFF; 5]);
    offer_all(&handle, first);
    assert_eq!(
        next_signal(&mut events, &mut progress).await,
        ControlMessage::NeedNextCycle
    );

    offer_all(&handle, cycle_datagrams(&p, &raw, 1));
    assert_eq!(
        next_signal(&mut events, &mut progress).await,
        ControlMessage::NeedNextCycle
    );

    offer_all(&handle, cycle_datagrams(&p, &raw, 2));
    assert_eq!(
        next_signal(&mut events, &mut progress).await,
        ControlMessage::FullFileSaved
    );

    assert_eq!(progress.len(), 10);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&100));

    let out = tokio::fs::read(root.join("rcv.cache.raw"))
        .await
        .expect("output file");
    assert_eq!(out, raw);

    let status = handle.status().await.expect("status");
    assert_eq!(status.state, DecoderState::Finalized);
    assert_eq!(status.confirmed_blocks, 10);

    // Late retransmissions after completion change nothing.
    offer_all(&handle, cycle_datagrams(&p, &raw, 2));
    handle.shutdown().await.expect("shutdown");
    join.await.expect("join").expect("service");
    assert!(!status_rx.borrow().running);

    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn stray_cycle_burst_requests_one_correction() {
    let root = unique_temp_dir("blockcast_e2e_stray");
    let p = params(2500);
    let raw = raw_file(2500);
    let (handle, _status_rx, mut events, join) =
        start_service(service_config(&root, p, false)).await.expect("start");
    let mut progress = Vec::new();

    // The sender ran ahead: all of cycle 1 arrives while the receiver waits in cycle 0.
    offer_all(&handle, cycle_datagrams(&p, &raw, 1));
    assert_eq!(
        next_signal(&mut events, &mut progress).await,
        ControlMessage::ChangeCycle { cycle: 0 }
    );

    // Once the sender complies the transfer proceeds normally.
    offer_all(&handle, cycle_datagrams(&p, &raw, 0));
    assert_eq!(
        next_signal(&mut events, &mut progress).await,
        ControlMessage::NeedNextCycle
    );

    let status = handle.status().await.expect("status");
    assert_eq!(status.state, DecoderState::Ready { cycle: 1 });
    assert_eq!(status.confirmed_blocks, 4);
    assert_eq!(status.correction_attempts, 0);

    handle.shutdown().await.expect("shutdown");
    join.await.expect("join").expect("service");
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn restarted_receiver_resumes_from_manifest() {
    let root = unique_temp_dir("blockcast_e2e_resume");
    let p = params(2500);
    let raw = raw_file(2500);
    let mut progress = Vec::new();

    {
        let (handle, _status_rx, mut events, join) =
            start_service(service_config(&root, p, true)).await.expect("start");
        offer_all(&handle, cycle_datagrams(&p, &raw, 0));
        assert_eq!(
            next_signal(&mut events, &mut progress).await,
            ControlMessage::NeedNextCycle
        );
        offer_all(&handle, cycle_datagrams(&p, &raw, 1));
        assert_eq!(
            next_signal(&mut events, &mut progress).await,
            ControlMessage::NeedNextCycle
        );
        handle.shutdown().await.expect("shutdown");
        join.await.expect("join").expect("service");
    }

    let (handle, status_rx, mut events, join) =
        start_service(service_config(&root, p, true)).await.expect("restart");
    {
        let status = status_rx.borrow();
        assert_eq!(status.state, DecoderState::Ready { cycle: 2 });
        assert_eq!(status.confirmed_blocks, 8);
    }

    offer_all(&handle, cycle_datagrams(&p, &raw, 2));
    assert_eq!(
        next_signal(&mut events, &mut progress).await,
        ControlMessage::FullFileSaved
    );
    let out = tokio::fs::read(root.join("rcv.cache.raw"))
        .await
        .expect("output file");
    assert_eq!(out, raw);

    handle.shutdown().await.expect("shutdown");
    join.await.expect("join").expect("service");
    let _ = std::fs::remove_dir_all(&root);
}
