use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::common::types::FrameId;

/// LRU (Least Recently Used) victim selector over unpinned frames.
///
/// The map's insertion order doubles as recency order: the front entry is
/// the oldest candidate, the back the most recently inserted. All operations
/// are O(1) amortized and serialized by the replacer's own mutex.
pub struct LruReplacer {
    entries: Mutex<LinkedHashMap<FrameId, ()>>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LinkedHashMap::new()),
        }
    }

    /// Record `frame_id` as most recently used. Re-inserting an existing
    /// frame moves it to the MRU end.
    pub fn insert(&self, frame_id: FrameId) {
        let mut entries = self.entries.lock();
        entries.remove(&frame_id);
        entries.insert(frame_id, ());
    }

    /// Pop the least recently used frame, if any.
    pub fn victim(&self) -> Option<FrameId> {
        self.entries.lock().pop_front().map(|(frame_id, _)| frame_id)
    }

    /// Remove `frame_id` from consideration. Returns whether it was present.
    pub fn erase(&self, frame_id: FrameId) -> bool {
        self.entries.lock().remove(&frame_id).is_some()
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order() {
        let replacer = LruReplacer::new();
        replacer.insert(1);
        replacer.insert(2);
        replacer.insert(3);
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_reinsert_refreshes() {
        let replacer = LruReplacer::new();
        replacer.insert(1);
        replacer.insert(2);
        replacer.insert(1); // 1 becomes most recent

        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_erase() {
        let replacer = LruReplacer::new();
        replacer.insert(1);
        replacer.insert(2);

        assert!(replacer.erase(1));
        assert!(!replacer.erase(1));
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(2));
    }
}
