//! Polling cadence and per-loop scheduling.
//!
//! The scheduler is plain state: it never sleeps or spawns. The engine
//! driver asks it when each loop is next due, tells it when fetches start
//! and finish, and feeds it the cadence derived from the latest metadata.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::Generation;
use crate::classifier::StateClass;
use crate::guard::Busy;
use crate::guard::FetchGuard;
use crate::guard::FetchKind;
use crate::normalize::BundleMetadataView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Refetch this long after each completion.
    Poll(#[serde(with = "millis")] Duration),
    /// No automatic refetch.
    OneShot,
}

impl Cadence {
    /// Poll until metadata says the bundle is terminal. No metadata yet (or
    /// metadata lost to an error) means poll.
    pub fn for_metadata(metadata: Option<&BundleMetadataView>, interval: Duration) -> Self {
        match metadata.map(BundleMetadataView::state_class) {
            Some(StateClass::Terminal) => Self::OneShot,
            Some(StateClass::Transient) | None => Self::Poll(interval),
        }
    }
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

#[derive(Debug)]
struct LoopSchedule {
    guard: FetchGuard,
    next_due: Option<Instant>,
    /// One more fetch owed after the cadence went one-shot mid-flight.
    /// Only used with `final_contents_fetch`.
    final_fetch_pending: bool,
}

impl LoopSchedule {
    fn new(kind: FetchKind) -> Self {
        Self {
            guard: FetchGuard::new(kind),
            next_due: None,
            final_fetch_pending: false,
        }
    }
}

#[derive(Debug)]
pub struct PollingScheduler {
    interval: Duration,
    final_contents_fetch: bool,
    cadence: Cadence,
    active: bool,
    metadata: LoopSchedule,
    contents: LoopSchedule,
}

impl PollingScheduler {
    pub fn new(interval: Duration, final_contents_fetch: bool) -> Self {
        Self {
            interval,
            final_contents_fetch,
            cadence: Cadence::Poll(interval),
            active: false,
            metadata: LoopSchedule::new(FetchKind::Metadata),
            contents: LoopSchedule::new(FetchKind::Contents),
        }
    }

    fn slot(&self, kind: FetchKind) -> &LoopSchedule {
        match kind {
            FetchKind::Metadata => &self.metadata,
            FetchKind::Contents => &self.contents,
        }
    }

    fn slot_mut(&mut self, kind: FetchKind) -> &mut LoopSchedule {
        match kind {
            FetchKind::Metadata => &mut self.metadata,
            FetchKind::Contents => &mut self.contents,
        }
    }

    pub fn next_due(&self, kind: FetchKind) -> Option<Instant> {
        self.slot(kind).next_due
    }

    pub fn is_in_flight(&self, kind: FetchKind) -> bool {
        !self.slot(kind).guard.is_idle()
    }

    /// True while either loop has a fetch scheduled or outstanding.
    pub fn has_work(&self) -> bool {
        [&self.metadata, &self.contents]
            .iter()
            .any(|slot| slot.next_due.is_some() || !slot.guard.is_idle())
    }

    /// New identity: poll cadence, both loops due immediately. Guards are
    /// left alone; a fetch still out for the old identity keeps its slot
    /// until it completes.
    pub fn restart(&mut self, now: Instant) {
        self.active = true;
        self.cadence = Cadence::Poll(self.interval);
        for kind in [FetchKind::Metadata, FetchKind::Contents] {
            let slot = self.slot_mut(kind);
            slot.next_due = Some(now);
            slot.final_fetch_pending = false;
        }
    }

    /// No identity: nothing is scheduled.
    pub fn stop(&mut self) {
        self.active = false;
        for kind in [FetchKind::Metadata, FetchKind::Contents] {
            let slot = self.slot_mut(kind);
            slot.next_due = None;
            slot.final_fetch_pending = false;
        }
    }

    /// A due tick fired. Consumes the tick either way; a skipped tick is
    /// rescheduled when the outstanding fetch completes.
    pub fn try_start(&mut self, kind: FetchKind, generation: Generation) -> Result<(), Busy> {
        let slot = self.slot_mut(kind);
        slot.next_due = None;
        slot.guard.try_acquire(generation)
    }

    /// Manual revalidation. Returns `false` (and schedules nothing) when a
    /// fetch of this kind is already out.
    pub fn request_now(&mut self, kind: FetchKind, now: Instant) -> bool {
        if !self.active {
            return false;
        }
        let slot = self.slot_mut(kind);
        if !slot.guard.is_idle() {
            return false;
        }
        slot.next_due = Some(now);
        true
    }

    /// A fetch of `kind` finished. `stale` completions belonged to an older
    /// identity; the current identity is then served right away.
    pub fn complete(&mut self, kind: FetchKind, stale: bool, now: Instant) -> Option<Generation> {
        let active = self.active;
        let cadence = self.cadence;
        let slot = self.slot_mut(kind);
        let generation = slot.guard.release();

        slot.next_due = if !active {
            None
        } else if stale {
            Some(now)
        } else {
            match cadence {
                Cadence::Poll(interval) => Some(now + interval),
                Cadence::OneShot if std::mem::take(&mut slot.final_fetch_pending) => Some(now),
                Cadence::OneShot => None,
            }
        };
        generation
    }

    /// Apply the cadence computed from fresh metadata. Returns whether it
    /// changed.
    pub fn set_cadence(&mut self, cadence: Cadence, now: Instant) -> bool {
        let previous = std::mem::replace(&mut self.cadence, cadence);
        if previous == cadence || !self.active {
            return false;
        }

        match cadence {
            Cadence::OneShot => {
                self.metadata.next_due = None;
                self.metadata.final_fetch_pending = false;
                let final_fetch = self.final_contents_fetch;
                let contents = &mut self.contents;
                if final_fetch {
                    // Outputs may still land while the bundle finalizes; read
                    // the contents once more before going quiet.
                    if contents.guard.is_idle() {
                        contents.next_due = Some(now);
                    } else {
                        contents.next_due = None;
                        contents.final_fetch_pending = true;
                    }
                } else if contents.next_due.is_some_and(|due| due > now) {
                    // Only the pending poll tick is dropped. A fetch already
                    // owed (first read, manual refresh) still runs.
                    contents.next_due = None;
                }
            }
            Cadence::Poll(interval) => {
                for kind in [FetchKind::Metadata, FetchKind::Contents] {
                    let slot = self.slot_mut(kind);
                    slot.final_fetch_pending = false;
                    if slot.guard.is_idle() && slot.next_due.is_none() {
                        slot.next_due = Some(now + interval);
                    }
                }
            }
        }
        true
    }
}
