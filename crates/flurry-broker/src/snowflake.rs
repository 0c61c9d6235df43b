//! Per-proxy rendezvous state and the admission handoff object.
//!
//! A [`Snowflake`] is the broker's record of one volunteer proxy. Records are
//! shared behind `Arc` between the serialiser (which moves them in and out of
//! the registry) and the two request paths (the client path writes the offer
//! and reads the answer; the proxy path reads the offer and writes the
//! answer). The inboxes are the only synchronisation surface between paired
//! requests; the two small atomics are only ever written under the broker
//! state lock or by the single task that owns the record at that point.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};

/// A volunteer proxy currently known to the broker.
///
/// The two inboxes are capacity-1 channels: each carries at most one payload
/// during the record's lifetime, so a send never blocks, and a payload sent
/// after the receiver has resigned is dropped together with the record.
pub struct Snowflake {
    id: String,
    clients: AtomicUsize,
    /// Position inside the registry heap, or -1 when not enclosed.
    index: AtomicI64,
    offer_tx: mpsc::Sender<Bytes>,
    offer_rx: Mutex<mpsc::Receiver<Bytes>>,
    answer_tx: mpsc::Sender<Bytes>,
    answer_rx: Mutex<mpsc::Receiver<Bytes>>,
}

impl Snowflake {
    /// Creates a fresh record with no assigned clients.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_clients(id, 0)
    }

    pub(crate) fn with_clients(id: impl Into<String>, clients: usize) -> Self {
        let (offer_tx, offer_rx) = mpsc::channel(1);
        let (answer_tx, answer_rx) = mpsc::channel(1);
        Self {
            id: id.into(),
            clients: AtomicUsize::new(clients),
            index: AtomicI64::new(-1),
            offer_tx,
            offer_rx: Mutex::new(offer_rx),
            answer_tx,
            answer_rx: Mutex::new(answer_rx),
        }
    }

    /// The proxy-chosen session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of client offers assigned to this proxy.
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    pub(crate) fn add_client(&self) {
        self.clients.fetch_add(1, Ordering::Relaxed);
    }

    /// Current registry position, or -1 when removed.
    pub fn index(&self) -> i64 {
        self.index.load(Ordering::Relaxed)
    }

    pub(crate) fn set_index(&self, index: i64) {
        self.index.store(index, Ordering::Relaxed);
    }

    /// Hands a client offer to this proxy.
    ///
    /// Never blocks: the inbox holds one slot and a record is matched to at
    /// most one client, so the slot is known to be free.
    pub fn send_offer(&self, offer: Bytes) {
        let _ = self.offer_tx.try_send(offer);
    }

    /// Waits for a client offer, up to `timeout`.
    pub async fn recv_offer(&self, timeout: Duration) -> Option<Bytes> {
        let mut rx = self.offer_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Delivers the proxy's answer.
    ///
    /// Never blocks. If the client has already resigned, the answer stays in
    /// the buffer and is discarded with the record; the client gave up, so
    /// the proxy is not stalled.
    pub fn send_answer(&self, answer: Bytes) {
        let _ = self.answer_tx.try_send(answer);
    }

    /// Waits for the matched proxy's answer, up to `timeout`.
    pub async fn recv_answer(&self, timeout: Duration) -> Option<Bytes> {
        let mut rx = self.answer_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

impl std::fmt::Debug for Snowflake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snowflake")
            .field("id", &self.id)
            .field("clients", &self.clients())
            .field("index", &self.index())
            .finish()
    }
}

/// A proxy poll awaiting admission by the serialiser.
///
/// Carries the session id the proxy chose and a one-shot channel on which
/// the admission forwarder delivers the matched offer (`Some`) or the
/// timeout signal (`None`). Garbage once either has been sent.
pub struct PendingProxy {
    pub id: String,
    pub offer_tx: oneshot::Sender<Option<Bytes>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_snowflake_starts_unregistered() {
        let s = Snowflake::new("p1");
        assert_eq!(s.id(), "p1");
        assert_eq!(s.clients(), 0);
        assert_eq!(s.index(), -1);
    }

    #[tokio::test]
    async fn test_offer_inbox_round_trip() {
        let s = Snowflake::new("p1");
        s.send_offer(Bytes::from_static(b"offer"));
        let got = s.recv_offer(Duration::from_millis(100)).await;
        assert_eq!(got, Some(Bytes::from_static(b"offer")));
    }

    #[tokio::test]
    async fn test_offer_recv_times_out_without_sender() {
        let s = Snowflake::new("p1");
        let got = s.recv_offer(Duration::from_millis(20)).await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_late_answer_is_dropped_not_blocking() {
        let s = Snowflake::new("p1");
        // No receiver armed; both sends must complete without blocking and
        // the second lands on a full buffer.
        s.send_answer(Bytes::from_static(b"first"));
        s.send_answer(Bytes::from_static(b"second"));
        let got = s.recv_answer(Duration::from_millis(100)).await;
        assert_eq!(got, Some(Bytes::from_static(b"first")));
    }
}
