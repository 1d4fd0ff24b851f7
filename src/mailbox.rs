//! Single-slot snapshot mailbox
//!
//! The analyzer writes, the publisher takes. A write always replaces whatever
//! is unread, so the publisher sees the newest snapshot or nothing, never a
//! backlog. The slot is an `ArcSwapOption`; a one-element channel acts as the
//! doorbell the publisher sleeps on.

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::analysis::AnalysisSnapshot;

/// Latest-wins handoff between analyzer and publisher
pub struct SnapshotMailbox {
    slot: ArcSwapOption<AnalysisSnapshot>,
    /// Sequence + 1 of the last snapshot taken (0 = none yet)
    taken_floor: AtomicU64,
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
    written: AtomicU64,
    taken: AtomicU64,
    overwritten: AtomicU64,
}

impl SnapshotMailbox {
    pub fn new() -> Self {
        let (doorbell_tx, doorbell_rx) = bounded(1);
        Self {
            slot: ArcSwapOption::empty(),
            taken_floor: AtomicU64::new(0),
            doorbell_tx,
            doorbell_rx,
            written: AtomicU64::new(0),
            taken: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Publish a snapshot, replacing any unread one. Never blocks.
    pub fn write(&self, snapshot: AnalysisSnapshot) {
        let previous = self.slot.swap(Some(Arc::new(snapshot)));
        self.written.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        // Full means a wake-up is already pending
        let _ = self.doorbell_tx.try_send(());
    }

    /// Take the unread snapshot, if any
    ///
    /// A snapshot whose sequence is not newer than the last one taken is
    /// discarded, so callers only ever see increasing sequence numbers.
    pub fn try_take(&self) -> Option<Arc<AnalysisSnapshot>> {
        let snapshot = self.slot.swap(None)?;

        let floor = self.taken_floor.load(Ordering::Acquire);
        if snapshot.sequence < floor {
            tracing::trace!("Discarding stale snapshot {}", snapshot.sequence);
            return None;
        }

        self.taken_floor
            .store(snapshot.sequence.saturating_add(1), Ordering::Release);
        self.taken.fetch_add(1, Ordering::Relaxed);
        Some(snapshot)
    }

    /// Whether a snapshot is waiting
    pub fn has_pending(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Becomes ready after each write; for `recv_timeout` or `select!`
    pub fn doorbell(&self) -> &Receiver<()> {
        &self.doorbell_rx
    }

    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            written: self.written.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
        }
    }
}

impl Default for SnapshotMailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Mailbox statistics
#[derive(Debug, Clone, Default)]
pub struct MailboxStats {
    pub written: u64,
    pub taken: u64,
    /// Snapshots replaced before anyone took them
    pub overwritten: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn snapshot(sequence: u64) -> AnalysisSnapshot {
        AnalysisSnapshot::neutral(sequence, sequence * 50, 48_000, 2, 4)
    }

    #[test]
    fn test_empty_mailbox() {
        let mailbox = SnapshotMailbox::new();
        assert!(mailbox.try_take().is_none());
        assert!(!mailbox.has_pending());
    }

    #[test]
    fn test_latest_wins() {
        let mailbox = SnapshotMailbox::new();
        for seq in 1..=5 {
            mailbox.write(snapshot(seq));
        }

        assert!(mailbox.has_pending());
        assert_eq!(mailbox.try_take().unwrap().sequence, 5);
        assert!(mailbox.try_take().is_none());

        let stats = mailbox.stats();
        assert_eq!(stats.written, 5);
        assert_eq!(stats.taken, 1);
        assert_eq!(stats.overwritten, 4);
    }

    #[test]
    fn test_stale_snapshot_discarded() {
        let mailbox = SnapshotMailbox::new();
        mailbox.write(snapshot(10));
        assert_eq!(mailbox.try_take().unwrap().sequence, 10);

        mailbox.write(snapshot(10));
        assert!(mailbox.try_take().is_none());
        mailbox.write(snapshot(3));
        assert!(mailbox.try_take().is_none());

        mailbox.write(snapshot(11));
        assert_eq!(mailbox.try_take().unwrap().sequence, 11);
    }

    #[test]
    fn test_doorbell_rings_once_per_batch() {
        let mailbox = SnapshotMailbox::new();
        assert!(mailbox.doorbell().try_recv().is_err());

        mailbox.write(snapshot(1));
        mailbox.write(snapshot(2));
        assert!(mailbox.doorbell().recv_timeout(Duration::from_millis(10)).is_ok());
        assert!(mailbox.doorbell().try_recv().is_err());
    }

    #[test]
    fn test_concurrent_writer_reader_monotonic() {
        let mailbox = Arc::new(SnapshotMailbox::new());
        let writer = {
            let mailbox = Arc::clone(&mailbox);
            std::thread::spawn(move || {
                for seq in 1..=2000 {
                    mailbox.write(snapshot(seq));
                }
            })
        };

        let mut last = 0;
        let mut seen = 0;
        while !writer.is_finished() || mailbox.has_pending() {
            if let Some(snap) = mailbox.try_take() {
                assert!(snap.sequence > last);
                last = snap.sequence;
                seen += 1;
            }
        }
        writer.join().unwrap();

        assert!(seen >= 1);
        assert_eq!(last, 2000);
    }

    proptest! {
        #[test]
        fn prop_nth_write_is_retrievable(count in 1u64..64) {
            let mailbox = SnapshotMailbox::new();
            for seq in 1..=count {
                mailbox.write(snapshot(seq));
            }
            prop_assert_eq!(mailbox.try_take().map(|s| s.sequence), Some(count));
            prop_assert!(mailbox.try_take().is_none());
        }

        #[test]
        fn prop_takes_are_increasing(sequences in proptest::collection::vec(0u64..1000, 1..100)) {
            let mailbox = SnapshotMailbox::new();
            let mut last: Option<u64> = None;
            for seq in sequences {
                mailbox.write(snapshot(seq));
                if let Some(snap) = mailbox.try_take() {
                    if let Some(prev) = last {
                        prop_assert!(snap.sequence > prev);
                    }
                    last = Some(snap.sequence);
                }
            }
        }
    }
}
