//! Retirement channel between dropped keys and the map that watched them.
//!
//! Each map owns one unbounded channel. A key registers a [`Notifier`] clone
//! per cell it appears in; when the key's last strong handle drops, the
//! notifier sends that cell's id. The map is the only receiver and drains the
//! queue at the start of its operations.

use crate::slot_table::CellId;
use crossbeam_channel::{Receiver, Sender};

/// Sending half handed to watched keys.
#[derive(Clone, Debug)]
pub(crate) struct Notifier(Sender<CellId>);

impl Notifier {
    /// Announce that `cell`'s key became unreachable. Sending after the map
    /// dropped its receiver is harmless and ignored.
    pub(crate) fn notify(&self, cell: CellId) {
        let _ = self.0.send(cell);
    }

    pub(crate) fn same_channel(&self, other: &Notifier) -> bool {
        self.0.same_channel(&other.0)
    }
}

/// Receiving half owned by a map, plus the notifier it registers keys with.
#[derive(Debug)]
pub(crate) struct Retirements {
    notifier: Notifier,
    queue: Receiver<CellId>,
}

impl Retirements {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            notifier: Notifier(tx),
            queue: rx,
        }
    }

    pub(crate) fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Take the next retired cell id, if any is queued.
    #[inline]
    pub(crate) fn poll(&self) -> Option<CellId> {
        self.queue.try_recv().ok()
    }

    /// Throw away everything currently queued; returns how many ids were dropped.
    pub(crate) fn discard_pending(&self) -> usize {
        self.queue.try_iter().count()
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }
}
