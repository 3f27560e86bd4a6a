//! Bounded frame cache between the capture loop and facade readers.
//!
//! One writer inserts encoded buffers; any number of readers fetch by
//! frame number or latest. All operations splice under a single mutex and
//! never hold it across an encode, so lock hold time is bounded by the
//! capacity, not by camera speed.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::trace;

pub(crate) struct CachedFrame {
    pub(crate) number: u64,
    pub(crate) buffer: Bytes,
}

/// Fixed-capacity, insertion-ordered cache of encoded frames. Eviction is
/// strict FIFO: a frame that has been read is exactly as evictable as one
/// that never was.
pub(crate) struct FrameCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    frames: VecDeque<CachedFrame>,
    next_number: u64,
}

impl FrameCache {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame cache capacity must be at least 1");
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                frames: VecDeque::with_capacity(capacity),
                next_number: 0,
            }),
        }
    }

    /// Capacity fixed at construction; bounds memory, never throughput.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Assign the next frame number and append the buffer, evicting the
    /// single oldest frame first when full. Never rejects new data.
    pub(crate) fn insert(&self, buffer: Bytes) -> u64 {
        let mut inner = self.lock();
        if inner.frames.len() == self.capacity {
            // Dropping the evicted entry releases its buffer immediately.
            let evicted = inner.frames.pop_front();
            if let Some(evicted) = evicted {
                trace!(frame = evicted.number, "evicted oldest cached frame");
            }
        }
        let number = inner.next_number;
        inner.next_number += 1;
        inner.frames.push_back(CachedFrame { number, buffer });
        metrics::gauge!("cloud_cache_frames").set(inner.frames.len() as f64);
        number
    }

    /// Snapshot of retained frame numbers, oldest first.
    pub(crate) fn frame_numbers(&self) -> Vec<u64> {
        self.lock().frames.iter().map(|frame| frame.number).collect()
    }

    /// Exact-number lookup; `None` once evicted or if never inserted.
    pub(crate) fn get(&self, number: u64) -> Option<Bytes> {
        self.lock()
            .frames
            .iter()
            .find(|frame| frame.number == number)
            .map(|frame| frame.buffer.clone())
    }

    /// Most recently inserted buffer, `None` while empty.
    pub(crate) fn latest(&self) -> Option<Bytes> {
        self.lock().frames.back().map(|frame| frame.buffer.clone())
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().frames.len()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        // The critical sections are pure list splices that cannot panic
        // midway, so a poisoned guard still holds a consistent list.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
