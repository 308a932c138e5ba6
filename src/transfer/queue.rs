use tokio::sync::mpsc;

/// Producer half of the inbound datagram queue, held by the network receive task.
#[derive(Debug, Clone)]
pub struct DatagramSender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl DatagramSender {
    /// Queues one raw datagram. Returns `false` once the consumer is gone.
    pub fn offer(&self, datagram: Vec<u8>) -> bool {
        self.tx.send(datagram).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the inbound datagram queue. FIFO, single consumer.
#[derive(Debug)]
pub struct DatagramQueue {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

pub fn datagram_queue() -> (DatagramSender, DatagramQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DatagramSender { tx }, DatagramQueue { rx })
}

impl DatagramQueue {
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Waits for the next datagram. `None` once every producer is dropped and the queue drained.
    pub async fn dequeue(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    pub fn try_dequeue(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Discards everything buffered so far. Returns how many datagrams were dropped.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dequeues_in_fifo_order() {
        let (tx, mut q) = datagram_queue();
        assert!(q.is_empty());
        assert!(tx.offer(vec![1]));
        assert!(tx.offer(vec![2]));
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue().await, Some(vec![1]));
        assert_eq!(q.try_dequeue(), Some(vec![2]));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn dequeue_wakes_on_arrival() {
        let (tx, mut q) = datagram_queue();
        let producer = tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.offer(vec![7, 7])
        });
        assert_eq!(q.dequeue().await, Some(vec![7, 7]));
        assert!(producer.await.expect("join"));
        assert_eq!(q.dequeue().await, None);
    }

    #[test]
    fn clear_discards_buffered_datagrams() {
        let (tx, mut q) = datagram_queue();
        for i in 0..5u8 {
            tx.offer(vec![i]);
        }
        assert_eq!(q.clear(), 5);
        assert!(q.is_empty());
        drop(q);
        assert!(!tx.offer(vec![0]));
        assert!(tx.is_closed());
    }
}
