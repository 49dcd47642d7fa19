//! Background peer persistence.
//!
//! `add_peer` must never wait on SQLite, so rows are handed to a dedicated
//! thread through a bounded queue. When the queue is full the write is
//! dropped and counted rather than blocking the caller; the cache already
//! holds the fresh value and the next sighting of the peer re-enqueues it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use tokio::sync::{mpsc, oneshot};

use crate::db::Database;
use crate::peer::Peer;

/// Counters shared by the store and its writer thread.
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) cache_hits:     AtomicU64,
    pub(crate) cache_misses:   AtomicU64,
    pub(crate) db_reads:       AtomicU64,
    pub(crate) db_writes:      AtomicU64,
    pub(crate) write_failures: AtomicU64,
    pub(crate) writes_dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

enum WriteOp {
    Peer(Peer),
    Flush(oneshot::Sender<()>),
}

pub(crate) struct PeerWriter {
    tx:      Option<mpsc::Sender<WriteOp>>,
    pending: Arc<AtomicUsize>,
    stats:   Arc<Counters>,
    handle:  Option<JoinHandle<()>>,
}

impl PeerWriter {
    pub(crate) fn spawn(db: Arc<Database>, capacity: usize, stats: Arc<Counters>) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::channel::<WriteOp>(capacity);
        let pending = Arc::new(AtomicUsize::new(0));

        let thread_pending = Arc::clone(&pending);
        let thread_stats   = Arc::clone(&stats);
        let handle = std::thread::Builder::new()
            .name("layer-peer-writer".into())
            .spawn(move || {
                while let Some(op) = rx.blocking_recv() {
                    match op {
                        WriteOp::Peer(peer) => {
                            match db.save_peer(&peer) {
                                Ok(())  => Counters::bump(&thread_stats.db_writes),
                                Err(e) => {
                                    Counters::bump(&thread_stats.write_failures);
                                    tracing::warn!("[layer] persisting peer {} failed: {e}", peer.id);
                                }
                            }
                            thread_pending.fetch_sub(1, Ordering::AcqRel);
                        }
                        WriteOp::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                tracing::debug!("[layer] peer writer stopped");
            })?;

        Ok(Self { tx: Some(tx), pending, stats, handle: Some(handle) })
    }

    /// Queue `peer` for persistence without blocking.
    pub(crate) fn enqueue(&self, peer: Peer) {
        let Some(tx) = &self.tx else { return };
        self.pending.fetch_add(1, Ordering::AcqRel);
        let id = peer.id;
        if let Err(e) = tx.try_send(WriteOp::Peer(peer)) {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            Counters::bump(&self.stats.writes_dropped);
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("[layer] peer write queue full; dropping write of {id}")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!("[layer] peer writer gone; dropping write of {id}")
                }
            }
        }
    }

    /// Writes accepted but not yet applied.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Resolve once every write queued before this call has been applied.
    pub(crate) async fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(WriteOp::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl Drop for PeerWriter {
    fn drop(&mut self) {
        // Closing the sender lets the thread drain the queue and exit.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("[layer] peer writer thread panicked");
            }
        }
    }
}
