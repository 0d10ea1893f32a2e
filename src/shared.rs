use crate::device::LogRing;
use crate::votes::VoteBuffer;
use parking_lot::Mutex;

/// Collection flag, vote window and last label move together under one lock
#[derive(Debug)]
struct CollectionState {
    active: bool,
    votes: VoteBuffer,
    last_recognized: Option<String>,
}

/// State shared between the device link, the frame collector and the HTTP
/// handlers. Critical sections are short and never perform I/O.
#[derive(Debug)]
pub struct SharedState {
    collection: Mutex<CollectionState>,
    device_log: Mutex<LogRing>,
}

impl SharedState {
    pub fn new(window_size: usize, log_capacity: usize) -> Self {
        Self {
            collection: Mutex::new(CollectionState {
                active: false,
                votes: VoteBuffer::new(window_size),
                last_recognized: None,
            }),
            device_log: Mutex::new(LogRing::new(log_capacity)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.collection.lock().active
    }

    /// Open a collection window. Returns true if collection was previously idle.
    pub fn activate(&self) -> bool {
        let mut collection = self.collection.lock();
        let was_idle = !collection.active;
        collection.active = true;
        was_idle
    }

    /// Record a frame's top label while collection is active.
    /// Returns false (and records nothing) when idle.
    pub fn record_vote(&self, label: &str) -> bool {
        let mut collection = self.collection.lock();
        if !collection.active {
            return false;
        }
        collection.votes.record(label);
        collection.last_recognized = Some(label.to_string());
        true
    }

    /// Take the full vote window, leaving an empty one behind and closing the
    /// collection. Returns `None` unless collection is active and the window full.
    pub fn take_window_if_full(&self) -> Option<VoteBuffer> {
        let mut collection = self.collection.lock();
        if !collection.active || !collection.votes.is_full() {
            return None;
        }
        let capacity = collection.votes.capacity();
        let window = std::mem::replace(&mut collection.votes, VoteBuffer::new(capacity));
        collection.active = false;
        Some(window)
    }

    pub fn vote_counts(&self) -> Vec<(String, usize)> {
        self.collection.lock().votes.counts()
    }

    pub fn vote_len(&self) -> usize {
        self.collection.lock().votes.len()
    }

    pub fn last_recognized(&self) -> Option<String> {
        self.collection.lock().last_recognized.clone()
    }

    pub fn push_log(&self, message: &str) -> bool {
        self.device_log.lock().push(message)
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.device_log.lock().messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_votes_only_recorded_while_active() {
        let shared = SharedState::new(3, 20);
        assert!(!shared.record_vote("good"));
        assert_eq!(shared.vote_len(), 0);
        assert_eq!(shared.last_recognized(), None);

        assert!(shared.activate());
        assert!(!shared.activate());
        assert!(shared.record_vote("good"));
        assert_eq!(shared.vote_len(), 1);
        assert_eq!(shared.last_recognized().as_deref(), Some("good"));
    }

    #[test]
    fn test_take_window_resets_and_deactivates() {
        let shared = SharedState::new(2, 20);
        shared.activate();
        shared.record_vote("bad");
        assert!(shared.take_window_if_full().is_none());

        shared.record_vote("bad");
        let window = shared.take_window_if_full().unwrap();
        assert_eq!(window.majority().as_deref(), Some("bad"));
        assert_eq!(shared.vote_len(), 0);
        assert!(!shared.is_active());
        assert!(shared.take_window_if_full().is_none());
    }

    #[test]
    fn test_device_log() {
        let shared = SharedState::new(2, 2);
        shared.push_log("a");
        shared.push_log("a");
        shared.push_log("b");
        shared.push_log("c");
        assert_eq!(shared.log_messages(), vec!["b", "c"]);
    }
}
