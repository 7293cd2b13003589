//! Latest-frame-wins handoff between the camera callback and the render thread.

use std::sync::atomic::{AtomicU64, Ordering};

use lens_api::{FramePlanes, FrameRef, FrameSink};
use parking_lot::Mutex;

/// Plane buffers kept around for reuse by the producer.
const MAX_SPARES: usize = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Frames copied into the slot.
    pub delivered: u64,
    /// Frames replaced by a newer one before the consumer took them.
    pub dropped: u64,
    /// Frames refused because of their format or size.
    pub rejected: u64,
}

/// Single-slot mailbox. The producer copies each frame outside the lock and swaps it in;
/// the consumer takes whatever is newest without waiting.
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<FramePlanes>>,
    spares: Mutex<Vec<FramePlanes>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest unconsumed frame, if any. Never blocks on the producer's copy.
    pub fn take_latest(&self) -> Option<FramePlanes> {
        self.latest.lock().take()
    }

    /// Hand a consumed frame back so its allocations can be reused.
    pub fn recycle(&self, planes: FramePlanes) {
        let mut spares = self.spares.lock();
        if spares.len() < MAX_SPARES {
            spares.push(planes);
        }
    }

    /// Swap already packed planes into the slot. Sizes are checked at draw time.
    pub fn publish(&self, planes: FramePlanes) {
        let superseded = self.latest.lock().replace(planes);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = superseded {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("frame {}x{} superseded before draw", old.width(), old.height());
            self.recycle(old);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.latest.lock().is_some()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

impl FrameSink for FrameSlot {
    fn on_frame(&self, frame: FrameRef<'_>) {
        let mut planes = self.spares.lock().pop().unwrap_or_default();
        if let Err(err) = planes.copy_from(&frame) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            log::warn!("frame rejected: {err}");
            self.recycle(planes);
            return;
        }
        self.publish(planes);
    }
}
