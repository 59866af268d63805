// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-thread request slots and their registry.
//!
//! Each filesystem-operation thread gets one slot on first use and keeps it
//! for the process lifetime. A slot has at most one outstanding request at
//! a time; the receiver loop finds it by the correlation id embedded in the
//! request frame and completes the one-shot channel the caller is parked on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use bytes::{Bytes, BytesMut};

/// Default buffer capacity a slot returns to when a large frame inflated it.
pub(crate) const DEFAULT_BUF_CAPACITY: usize = 10_000;

/// What the receiver loop (or the fault drain) hands back to a waiting
/// caller.
#[derive(Debug)]
pub(crate) enum SlotOutcome {
    Reply { command: u32, payload: Bytes },
    Fault,
}

#[derive(Debug)]
pub(crate) struct SlotInner {
    /// Encoded request frame, reused across the retry loop.
    pub(crate) request: BytesMut,
    /// Staging area for the reply payload.
    pub(crate) response: BytesMut,
    /// A request frame is on the wire and unanswered.
    pub(crate) sent: bool,
    /// Completion side of the current call's one-shot channel.
    pub(crate) reply_tx: Option<Sender<SlotOutcome>>,
}

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) correlation: u32,
    pub(crate) inner: Mutex<SlotInner>,
}

impl Slot {
    fn new(correlation: u32) -> Self {
        Self {
            correlation,
            inner: Mutex::new(SlotInner {
                request: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
                response: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
                sent: false,
                reply_tx: None,
            }),
        }
    }
}

impl SlotInner {
    /// Clear the request buffer and apply the capacity hysteresis for an
    /// upcoming frame of `needed` bytes.
    pub(crate) fn prepare_request(&mut self, needed: usize) {
        reset_capacity(&mut self.request, needed);
    }

    /// Make the response buffer hold exactly `len` writable bytes.
    pub(crate) fn prepare_response(&mut self, len: usize) {
        reset_capacity(&mut self.response, len);
        self.response.resize(len, 0);
    }

    /// Install a fresh one-shot channel for the next attempt.
    pub(crate) fn arm(&mut self) -> Receiver<SlotOutcome> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.reply_tx = Some(tx);
        self.sent = false;
        rx
    }

    /// Complete the pending call, if any thread is still waiting on it.
    pub(crate) fn complete(&mut self, outcome: SlotOutcome) {
        self.sent = false;
        if let Some(tx) = self.reply_tx.take() {
            // The caller may have given up (retry already underway); a
            // closed channel is fine.
            let _ = tx.send(outcome);
        }
    }
}

/// Buffer sizing: grow to exact need above the default capacity, snap back
/// to the default once the need fits it again. Avoids thrashing on every
/// call while not pinning a transient multi-megabyte listing forever.
fn reset_capacity(buf: &mut BytesMut, needed: usize) {
    if needed > DEFAULT_BUF_CAPACITY {
        if buf.capacity() != needed {
            *buf = BytesMut::with_capacity(needed);
        }
    } else if buf.capacity() > DEFAULT_BUF_CAPACITY {
        *buf = BytesMut::with_capacity(DEFAULT_BUF_CAPACITY);
    }
    buf.clear();
}

/// Slot storage: one map keyed by owning thread for the dispatcher, one
/// keyed by correlation id for the receiver loop. Both locks are held only
/// for insert/lookup, never across I/O.
#[derive(Debug, Default)]
pub(crate) struct SlotRegistry {
    by_thread: Mutex<HashMap<ThreadId, Arc<Slot>>>,
    by_id: Mutex<HashMap<u32, Arc<Slot>>>,
    next_correlation: AtomicU32,
}

impl SlotRegistry {
    pub(crate) fn new() -> Self {
        Self {
            by_thread: Mutex::new(HashMap::new()),
            by_id: Mutex::new(HashMap::new()),
            next_correlation: AtomicU32::new(1),
        }
    }

    /// The calling thread's slot, created with a fresh correlation id on
    /// first use.
    pub(crate) fn for_current_thread(&self) -> Arc<Slot> {
        let thread_id = std::thread::current().id();
        let mut by_thread = self.by_thread.lock().unwrap();
        if let Some(slot) = by_thread.get(&thread_id) {
            return Arc::clone(slot);
        }
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot::new(correlation));
        by_thread.insert(thread_id, Arc::clone(&slot));
        self.by_id.lock().unwrap().insert(correlation, Arc::clone(&slot));
        slot
    }

    pub(crate) fn by_correlation(&self, correlation: u32) -> Option<Arc<Slot>> {
        self.by_id.lock().unwrap().get(&correlation).cloned()
    }

    /// Fail every slot with a request on the wire. Run by the receiver
    /// loop while it holds the connection lock, so no new request can be
    /// sent mid-drain.
    pub(crate) fn fail_outstanding(&self) {
        let by_id = self.by_id.lock().unwrap();
        for slot in by_id.values() {
            let mut inner = slot.inner.lock().unwrap();
            if inner.sent {
                inner.complete(SlotOutcome::Fault);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_stable_per_thread() {
        let registry = SlotRegistry::new();
        let a = registry.for_current_thread();
        let b = registry.for_current_thread();
        assert_eq!(a.correlation, b.correlation);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn correlation_ids_are_unique_across_threads() {
        let registry = Arc::new(SlotRegistry::new());
        let mine = registry.for_current_thread().correlation;
        let theirs = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.for_current_thread().correlation)
                .join()
                .unwrap()
        };
        assert_ne!(mine, theirs);
        assert!(registry.by_correlation(mine).is_some());
        assert!(registry.by_correlation(theirs).is_some());
        assert!(registry.by_correlation(0).is_none());
    }

    #[test]
    fn buffer_hysteresis_grows_and_snaps_back() {
        let mut buf = BytesMut::with_capacity(DEFAULT_BUF_CAPACITY);

        reset_capacity(&mut buf, 64 * 1024);
        assert!(buf.capacity() >= 64 * 1024);

        reset_capacity(&mut buf, 100);
        assert!(buf.capacity() < 64 * 1024);
        assert!(buf.capacity() >= 100);
    }

    #[test]
    fn fault_drain_only_touches_sent_slots() {
        let registry = SlotRegistry::new();
        let slot = registry.for_current_thread();

        let rx = {
            let mut inner = slot.inner.lock().unwrap();
            let rx = inner.arm();
            inner.sent = true;
            rx
        };
        registry.fail_outstanding();
        assert!(matches!(rx.recv().unwrap(), SlotOutcome::Fault));

        // Re-armed but never marked sent: the drain must leave it alone.
        let rx = slot.inner.lock().unwrap().arm();
        registry.fail_outstanding();
        assert!(rx.try_recv().is_err());
    }
}
