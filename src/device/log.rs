use std::collections::VecDeque;

/// Bounded history of controller messages with consecutive repeats collapsed
#[derive(Debug, Clone)]
pub struct LogRing {
    entries: VecDeque<String>,
    capacity: usize,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message unless it repeats the newest entry.
    /// Returns whether the message was stored.
    pub fn push<S: Into<String>>(&mut self, message: S) -> bool {
        let message = message.into();
        if self.entries.back() == Some(&message) {
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
        true
    }

    /// Messages oldest first
    pub fn messages(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_duplicates_collapse() {
        let mut log = LogRing::new(20);
        assert!(log.push("Starting motors"));
        assert!(!log.push("Starting motors"));
        assert!(log.push("Sorted"));
        assert!(log.push("Starting motors"));

        assert_eq!(
            log.messages(),
            vec!["Starting motors", "Sorted", "Starting motors"]
        );
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = LogRing::new(3);
        for message in ["a", "b", "c", "d"] {
            log.push(message);
        }
        assert_eq!(log.messages(), vec!["b", "c", "d"]);
        assert_eq!(log.len(), 3);
    }
}
