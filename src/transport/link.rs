//! In-memory point-to-point link.
//!
//! [`MemoryLink::pair`] returns two connected ends. Each end can be told to
//! fail or silently drop its next writes, which is how tests exercise the
//! retry paths without a radio.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};

use crate::core::{Transport, TransportError};

/// One end of an in-memory link.
#[derive(Debug)]
pub struct MemoryLink {
    tx: mpsc::Sender<Vec<u8>>,
    rx: Mutex<mpsc::Receiver<Vec<u8>>>,
    closed: Arc<watch::Sender<bool>>,
    fail_next: AtomicU32,
    drop_next: AtomicU32,
    delivered: AtomicU64,
}

impl MemoryLink {
    /// Two connected ends, each buffering up to `capacity` packets.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let capacity = capacity.max(1);
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);

        (
            Self::new(a_tx, a_rx, Arc::clone(&closed)),
            Self::new(b_tx, b_rx, closed),
        )
    }

    fn new(
        tx: mpsc::Sender<Vec<u8>>,
        rx: mpsc::Receiver<Vec<u8>>,
        closed: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            tx,
            rx: Mutex::new(rx),
            closed,
            fail_next: AtomicU32::new(0),
            drop_next: AtomicU32::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Make the next `n` writes on this end return an error.
    pub fn fail_next_sends(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes on this end report success but never arrive.
    pub fn drop_next_sends(&self, n: u32) {
        self.drop_next.store(n, Ordering::SeqCst);
    }

    /// Packets written by this end that reached the peer's queue.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Whether either end closed the link.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for MemoryLink {
    async fn send(&self, packet: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if Self::take_one(&self.fail_next) {
            return Err(TransportError::WriteFailed("injected failure".into()));
        }
        if Self::take_one(&self.drop_next) {
            return Ok(());
        }
        self.tx
            .send(packet.to_vec())
            .await
            .map_err(|_| TransportError::Closed)?;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return None;
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            packet = rx.recv() => packet,
            _ = closed.wait_for(|closed| *closed) => None,
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (a, b) = MemoryLink::pair(8);
        a.send(b"ping").await.unwrap();
        b.send(b"pong").await.unwrap();

        assert_eq!(b.recv().await, Some(b"ping".to_vec()));
        assert_eq!(a.recv().await, Some(b"pong".to_vec()));
        assert_eq!(a.delivered(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let (a, b) = MemoryLink::pair(8);
        a.fail_next_sends(2);
        assert!(matches!(a.send(b"1").await, Err(TransportError::WriteFailed(_))));
        assert!(matches!(a.send(b"2").await, Err(TransportError::WriteFailed(_))));
        a.send(b"3").await.unwrap();

        a.drop_next_sends(1);
        a.send(b"4").await.unwrap();
        a.send(b"5").await.unwrap();

        assert_eq!(b.recv().await, Some(b"3".to_vec()));
        assert_eq!(b.recv().await, Some(b"5".to_vec()));
        assert_eq!(a.delivered(), 2);
    }

    #[tokio::test]
    async fn test_close_ends_both_sides() {
        let (a, b) = MemoryLink::pair(8);
        let reader = tokio::spawn(async move { b.recv().await });

        tokio::task::yield_now().await;
        a.close().await;

        assert_eq!(reader.await.unwrap(), None);
        assert!(matches!(a.send(b"x").await, Err(TransportError::Closed)));
    }
}
