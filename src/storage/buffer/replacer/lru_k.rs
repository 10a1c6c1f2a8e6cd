use std::collections::{HashMap, VecDeque};
use log::trace;
use parking_lot::Mutex;

use crate::common::types::FrameId;
use crate::storage::buffer::error::BufferPoolError;

/// LRU-K page replacement policy.
///
/// A frame's backward K-distance is the time since its K-th most recent
/// access; frames with fewer than K recorded accesses have infinite
/// distance and are preferred as victims, ordered by their first access
/// (classical LRU). Two queues realize this: a history queue for frames
/// with fewer than K hits (insertion order, newest at the front) and a
/// cache queue for frames with at least K hits (moved to the front on
/// every access). Victims are taken from the history queue's tail first.
pub struct LruKReplacer {
    inner: Mutex<ReplacerState>,
    num_frames: usize,
    k: usize,
}

struct ReplacerState {
    entries: HashMap<FrameId, FrameEntry>,
    history: VecDeque<FrameId>,
    cache: VecDeque<FrameId>,
    evictable_count: usize,
}

struct FrameEntry {
    hits: usize,
    evictable: bool,
}

impl LruKReplacer {
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0);
        Self {
            inner: Mutex::new(ReplacerState {
                entries: HashMap::with_capacity(num_frames),
                history: VecDeque::with_capacity(num_frames),
                cache: VecDeque::with_capacity(num_frames),
                evictable_count: 0,
            }),
            num_frames,
            k,
        }
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        if frame_id >= self.num_frames {
            return Err(BufferPoolError::InvalidFrame(frame_id));
        }
        Ok(())
    }

    /// Record an access to `frame_id`, creating its entry on first touch
    pub fn record_access(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        self.check_frame(frame_id)?;
        let mut state = self.inner.lock();

        let entry = state.entries.entry(frame_id).or_insert(FrameEntry {
            hits: 0,
            evictable: false,
        });
        entry.hits += 1;
        let hits = entry.hits;

        if hits == 1 {
            state.history.push_front(frame_id);
        } else if hits == self.k {
            // Graduates from the history queue to the cache queue
            if let Some(pos) = state.history.iter().position(|&f| f == frame_id) {
                state.history.remove(pos);
            }
            state.cache.push_front(frame_id);
        } else if hits > self.k {
            if let Some(pos) = state.cache.iter().position(|&f| f == frame_id) {
                state.cache.remove(pos);
            }
            state.cache.push_front(frame_id);
        }
        // 1 < hits < k: stays where it is in the history queue

        Ok(())
    }

    /// Flip a frame's evictable flag. Unknown frames are a no-op.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<(), BufferPoolError> {
        self.check_frame(frame_id)?;
        let mut state = self.inner.lock();

        let Some(entry) = state.entries.get_mut(&frame_id) else {
            return Ok(());
        };
        if entry.evictable != evictable {
            entry.evictable = evictable;
            if evictable {
                state.evictable_count += 1;
            } else {
                state.evictable_count -= 1;
            }
        }
        Ok(())
    }

    /// Choose and remove a victim: the coldest evictable frame with fewer
    /// than K accesses, falling back to the cache queue.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.inner.lock();

        let pick = |queue: &VecDeque<FrameId>, entries: &HashMap<FrameId, FrameEntry>| {
            queue
                .iter()
                .rev()
                .position(|f| entries.get(f).map_or(false, |e| e.evictable))
                .map(|rev_pos| queue.len() - 1 - rev_pos)
        };

        if let Some(pos) = pick(&state.history, &state.entries) {
            let frame_id = state.history.remove(pos).unwrap();
            state.entries.remove(&frame_id);
            state.evictable_count -= 1;
            trace!("evicting frame {} from history queue", frame_id);
            return Some(frame_id);
        }
        if let Some(pos) = pick(&state.cache, &state.entries) {
            let frame_id = state.cache.remove(pos).unwrap();
            state.entries.remove(&frame_id);
            state.evictable_count -= 1;
            trace!("evicting frame {} from cache queue", frame_id);
            return Some(frame_id);
        }
        None
    }

    /// Forcibly drop a frame's history. Errors if the frame is tracked but
    /// not evictable.
    pub fn remove(&self, frame_id: FrameId) -> Result<(), BufferPoolError> {
        self.check_frame(frame_id)?;
        let mut state = self.inner.lock();

        let Some(entry) = state.entries.get(&frame_id) else {
            return Ok(());
        };
        if !entry.evictable {
            return Err(BufferPoolError::FrameNotEvictable(frame_id));
        }

        state.entries.remove(&frame_id);
        state.evictable_count -= 1;
        if let Some(pos) = state.history.iter().position(|&f| f == frame_id) {
            state.history.remove(pos);
        }
        if let Some(pos) = state.cache.iter().position(|&f| f == frame_id) {
            state.cache.remove(pos);
        }
        Ok(())
    }

    /// Number of currently evictable frames
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_frames_with_few_accesses() {
        let replacer = LruKReplacer::new(7, 2);

        // Frames 1 and 2 reach K accesses; 3 has a single access.
        for f in [1, 2, 3] {
            replacer.record_access(f).unwrap();
        }
        replacer.record_access(1).unwrap();
        replacer.record_access(2).unwrap();
        for f in [1, 2, 3] {
            replacer.set_evictable(f, true).unwrap();
        }
        assert_eq!(replacer.size(), 3);

        // Infinite distance wins over any K-distance
        assert_eq!(replacer.evict(), Some(3));
        // Then classical order within the cache queue: 1 was touched before 2
        assert_eq!(replacer.evict(), Some(1));
        assert_eq!(replacer.evict(), Some(2));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_history_ordered_by_first_access() {
        let replacer = LruKReplacer::new(4, 3);
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        // A second touch of frame 0 does not reorder the history queue
        replacer.record_access(0).unwrap();
        replacer.set_evictable(0, true).unwrap();
        replacer.set_evictable(1, true).unwrap();

        assert_eq!(replacer.evict(), Some(0));
        assert_eq!(replacer.evict(), Some(1));
    }

    #[test]
    fn test_non_evictable_frames_are_skipped() {
        let replacer = LruKReplacer::new(3, 2);
        replacer.record_access(0).unwrap();
        replacer.record_access(1).unwrap();
        replacer.set_evictable(1, true).unwrap();

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(1));
        // Frame 0 is known but pinned
        assert_eq!(replacer.evict(), None);

        replacer.set_evictable(0, true).unwrap();
        assert_eq!(replacer.evict(), Some(0));
    }

    #[test]
    fn test_remove_requires_evictable() {
        let replacer = LruKReplacer::new(2, 2);
        replacer.record_access(0).unwrap();
        assert!(replacer.remove(0).is_err());

        replacer.set_evictable(0, true).unwrap();
        replacer.remove(0).unwrap();
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);

        // Unknown frames are fine to remove
        replacer.remove(1).unwrap();
    }

    #[test]
    fn test_invalid_frame_id() {
        let replacer = LruKReplacer::new(2, 2);
        assert!(replacer.record_access(2).is_err());
        assert!(replacer.set_evictable(9, true).is_err());
    }
}
