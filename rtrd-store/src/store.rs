//! Versioned dataset store with serial-indexed diff history.
//!
//! The store keeps the current object set plus a bounded window of
//! diffs, one per retained serial. Every stored diff is re-applied
//! against each newly installed diff, so it always describes the path
//! from its serial straight to the current snapshot and a client query
//! is a single map lookup.

use crate::payload::{Flag, Payload};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Supplies the data a connection handler serves.
///
/// The [`Store`] is the default implementation; anything else that can
/// answer these four questions can stand in for it.
pub trait PayloadSource: Send + Sync {
    /// The session id labeling the current serial sequence.
    fn session_id(&self) -> u16;

    /// The serial of the current dataset, or `None` before the first
    /// install.
    fn current_serial(&self, session_id: u16) -> Option<u32>;

    /// The full current object set, or `None` if the supplier cannot
    /// produce one right now.
    fn current_objects(&self) -> Option<Arc<[Payload]>>;

    /// The coalesced changes leading from `serial` to the current
    /// dataset, or `None` when `serial` left the retained window.
    fn diff_since(&self, serial: u32) -> Option<Vec<Payload>>;
}

/// Splits `new` against `prev` by fingerprint.
///
/// Returns `(added, removed, unchanged)`; added and removed entries are
/// flagged accordingly, unchanged entries keep their flag.
pub fn compute_diff(
    new: &[Payload],
    prev: &[Payload],
) -> (Vec<Payload>, Vec<Payload>, Vec<Payload>) {
    let new_keys: HashMap<String, ()> = new.iter().map(|p| (p.key(), ())).collect();
    let prev_keys: HashMap<String, ()> = prev.iter().map(|p| (p.key(), ())).collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut unchanged = Vec::new();

    for payload in new {
        if !prev_keys.contains_key(&payload.key()) {
            let mut copy = payload.clone();
            copy.set_flag(Flag::Added);
            added.push(copy);
        }
    }
    for payload in prev {
        if !new_keys.contains_key(&payload.key()) {
            let mut copy = payload.clone();
            copy.set_flag(Flag::Removed);
            removed.push(copy);
        } else {
            unchanged.push(payload.clone());
        }
    }

    (added, removed, unchanged)
}

/// Applies a newer diff on top of `prev`, where `prev` is either a
/// snapshot or an older diff being kept current.
///
/// Entries of `prev` not touched by the diff survive; added entries of
/// the diff are taken as-is; removed entries are kept only when `prev`
/// did not announce the object (for a snapshot that means the object is
/// gone, for an older diff the withdrawal still needs relaying).
pub fn apply_diff(diff: &[Payload], prev: &[Payload]) -> Vec<Payload> {
    let diff_keys: HashMap<String, ()> = diff.iter().map(|p| (p.key(), ())).collect();
    let prev_by_key: HashMap<String, &Payload> = prev.iter().map(|p| (p.key(), p)).collect();

    let mut result = Vec::new();
    for payload in prev {
        if !diff_keys.contains_key(&payload.key()) {
            result.push(payload.clone());
        }
    }
    for payload in diff {
        match payload.flag() {
            Flag::Added => result.push(payload.clone()),
            Flag::Removed => match prev_by_key.get(&payload.key()) {
                None => result.push(payload.clone()),
                Some(prev_payload) if prev_payload.flag() == Flag::Removed => {
                    result.push(payload.clone())
                }
                Some(_) => {}
            },
        }
    }
    result
}

struct HistoryState {
    /// Retained diffs, each kept current against the latest snapshot.
    diffs: Vec<Vec<Payload>>,
    /// Serial -> index into `diffs` of the diff leading from that
    /// serial to the current snapshot.
    serial_index: HashMap<u32, usize>,
    /// Serials in install order, bounded by `keep_diff`.
    serials: Vec<u32>,
    current: Arc<[Payload]>,
    current_serial: u32,
    manual_serial: bool,
}

/// The versioned in-memory dataset.
pub struct Store {
    state: RwLock<HistoryState>,
    session_id: AtomicU16,
    keep_diff: usize,
}

impl Store {
    /// Creates a store retaining at most `keep_diff` diffs (0 keeps
    /// everything) with a randomized session id.
    pub fn new(keep_diff: usize) -> Self {
        Self::with_session_id(keep_diff, rand::random())
    }

    pub fn with_session_id(keep_diff: usize, session_id: u16) -> Self {
        Self {
            state: RwLock::new(HistoryState {
                diffs: Vec::new(),
                serial_index: HashMap::new(),
                serials: Vec::new(),
                current: Arc::from(Vec::new()),
                current_serial: 0,
                manual_serial: false,
            }),
            session_id: AtomicU16::new(session_id),
            keep_diff,
        }
    }

    pub fn session_id(&self) -> u16 {
        self.session_id.load(Ordering::Relaxed)
    }

    /// Resets the session id, breaking serial continuity for clients.
    pub fn set_session_id(&self, session_id: u16) {
        self.session_id.store(session_id, Ordering::Relaxed);
    }

    /// Freezes automatic serial generation; with manual mode on, every
    /// install keeps the serial last given to [`set_serial`](Self::set_serial).
    pub fn set_manual_serial(&self, manual: bool) {
        self.state.write().manual_serial = manual;
    }

    /// Overrides the serial. Meant to be called before data arrives.
    pub fn set_serial(&self, serial: u32) {
        self.state.write().current_serial = serial;
    }

    /// The current serial, or `None` before the first install.
    pub fn current_serial(&self) -> Option<u32> {
        let state = self.state.read();
        if state.serials.is_empty() {
            None
        } else {
            Some(state.current_serial)
        }
    }

    /// An owned view of the current object set.
    pub fn current_objects(&self) -> Arc<[Payload]> {
        self.state.read().current.clone()
    }

    pub fn object_count(&self) -> usize {
        self.state.read().current.len()
    }

    /// The changes a client at `serial` is missing. Empty when the
    /// client is current, `None` when the serial is unknown.
    pub fn diff_since(&self, serial: u32) -> Option<Vec<Payload>> {
        let state = self.state.read();
        if serial == state.current_serial {
            return Some(Vec::new());
        }
        state
            .serial_index
            .get(&serial)
            .and_then(|&idx| state.diffs.get(idx))
            .cloned()
    }

    /// Installs a full object set: computes the diff against the
    /// current snapshot and advances history by one serial.
    pub fn install_snapshot(&self, objects: Vec<Payload>) {
        let (added, removed, unchanged) = {
            let state = self.state.read();
            compute_diff(&objects, &state.current)
        };
        tracing::debug!(
            "computed diff: added ({}), removed ({}), unchanged ({})",
            added.len(),
            removed.len(),
            unchanged.len()
        );
        let mut diff = added;
        diff.extend(removed);
        self.install_diff(diff);
    }

    /// Installs a pre-computed diff against the current snapshot.
    ///
    /// Re-applies the diff onto every retained diff so each keeps
    /// describing the path from its serial to the new snapshot, then
    /// advances the serial, evicts beyond the window and re-indexes.
    pub fn install_diff(&self, diff: Vec<Payload>) {
        let mut state = self.state.write();

        let mut next_diffs: Vec<Vec<Payload>> = state
            .diffs
            .iter()
            .map(|old| apply_diff(&diff, old))
            .collect();
        let new_current: Arc<[Payload]> = apply_diff(&diff, &state.current).into();

        let prev_serial = state.current_serial;
        let new_serial = if !state.manual_serial && !state.serials.is_empty() {
            state.serials[state.serials.len() - 1].wrapping_add(1)
        } else {
            state.current_serial
        };

        let mut evicted: Vec<u32> = Vec::new();
        if self.keep_diff > 0 && state.serials.len() >= self.keep_diff {
            let n = state.serials.len() - self.keep_diff;
            evicted = state.serials.drain(..n).collect();
        }
        state.serials.push(new_serial);

        next_diffs.push(diff);
        if self.keep_diff > 0 && next_diffs.len() >= self.keep_diff {
            next_diffs.drain(..evicted.len());
        }

        let last = next_diffs.len() - 1;
        state.serial_index.insert(prev_serial, last);
        if !evicted.is_empty() {
            let shift = evicted.len();
            let reindexed = state
                .serial_index
                .iter()
                .filter_map(|(&serial, &idx)| {
                    if serial == prev_serial {
                        Some((serial, idx))
                    } else {
                        idx.checked_sub(shift).map(|idx| (serial, idx))
                    }
                })
                .collect();
            state.serial_index = reindexed;
            for serial in &evicted {
                state.serial_index.remove(serial);
            }
        }

        state.diffs = next_diffs;
        state.current = new_current;
        state.current_serial = new_serial;

        tracing::debug!(
            "installed serial {} ({} objects, {} retained diffs)",
            new_serial,
            state.current.len(),
            state.diffs.len()
        );
    }
}

impl PayloadSource for Store {
    fn session_id(&self) -> u16 {
        Store::session_id(self)
    }

    fn current_serial(&self, _session_id: u16) -> Option<u32> {
        Store::current_serial(self)
    }

    fn current_objects(&self) -> Option<Arc<[Payload]>> {
        Some(Store::current_objects(self))
    }

    fn diff_since(&self, serial: u32) -> Option<Vec<Payload>> {
        Store::diff_since(self, serial)
    }
}
