use tokio::sync::mpsc;

/// Signals the decoder raises for the sender/controller side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    BlockAcquired { sn: u64 },
    Progress { percent: u8 },
    NeedNextCycle,
    CorrectionTo { cycle: u32 },
    CorrectionStalled { cycle: u32, attempts: u32 },
    FullFileSaved,
}

/// Fire-and-forget event delivery. A dropped receiver never stalls the decoder.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<DecoderEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DecoderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: DecoderEvent) {
        tracing::trace!(?event, "decoder event");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<DecoderEvent>) -> Vec<DecoderEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_emission_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(DecoderEvent::BlockAcquired { sn: 1 });
        sink.emit(DecoderEvent::Progress { percent: 10 });
        assert_eq!(
            drain(&mut rx),
            vec![
                DecoderEvent::BlockAcquired { sn: 1 },
                DecoderEvent::Progress { percent: 10 }
            ]
        );
    }

    #[test]
    fn emitting_after_receiver_drop_is_harmless() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(DecoderEvent::NeedNextCycle);
        EventSink::disconnected().emit(DecoderEvent::FullFileSaved);
    }
}
