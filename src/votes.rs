use std::collections::VecDeque;

/// Rolling window of the most recent per-frame labels
#[derive(Debug, Clone)]
pub struct VoteBuffer {
    labels: VecDeque<String>,
    capacity: usize,
}

impl VoteBuffer {
    /// Create an empty window holding at most `capacity` labels
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            labels: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a label, evicting the oldest one once the window is full
    pub fn record<S: Into<String>>(&mut self, label: S) {
        if self.labels.len() == self.capacity {
            self.labels.pop_front();
        }
        self.labels.push_back(label.into());
    }

    pub fn is_full(&self) -> bool {
        self.labels.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        self.labels.clear();
    }

    /// Labels in arrival order, oldest first
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Per-label counts in order of first appearance within the window
    pub fn counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for label in &self.labels {
            match counts.iter_mut().find(|(seen, _)| seen == label) {
                Some((_, count)) => *count += 1,
                None => counts.push((label.clone(), 1)),
            }
        }
        counts
    }

    /// Most frequent label in the window.
    ///
    /// Ties go to the label whose first occurrence is earliest. Returns `None`
    /// for an empty window; callers decide whether a partial window is usable.
    pub fn majority(&self) -> Option<String> {
        let mut best: Option<(String, usize)> = None;
        for (label, count) in self.counts() {
            match &best {
                Some((_, best_count)) if count <= *best_count => {}
                _ => best = Some((label, count)),
            }
        }
        best.map(|(label, _)| label)
    }
}
