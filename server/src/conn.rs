//! Per-connection outbound handle.
//!
//! Each WebSocket session owns the receiving half; rooms and the lobby hold
//! clones of the sending half for the seat or queue entry it belongs to.

use eightball_shared::protocol::ServerMsg;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

impl ConnId {
    pub fn next() -> Self {
        ConnId(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ConnHandle {
    pub id: ConnId,
    tx: mpsc::Sender<ServerMsg>,
}

impl ConnHandle {
    pub fn new(id: ConnId, tx: mpsc::Sender<ServerMsg>) -> Self {
        Self { id, tx }
    }

    /// Open a fresh connection id with its outbound queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMsg>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(ConnId::next(), tx), rx)
    }

    /// Queue a message without waiting. Returns false if it was dropped.
    pub fn send(&self, msg: ServerMsg) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Connection {} outbound queue full, dropping message", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
