//! Remote candidate buffering
//!
//! Candidates that arrive before the first remote description cannot be
//! applied yet. They are kept in arrival order and drained exactly once, right
//! after the description is set.

/// Queue of remote candidates awaiting the first remote description
#[derive(Debug)]
pub enum CandidateQueue<C> {
    Pending(Vec<C>),
    /// Remote description is set, candidates go straight to the transport
    Applied,
}

impl<C> Default for CandidateQueue<C> {
    fn default() -> Self {
        CandidateQueue::Pending(Vec::new())
    }
}

impl<C> CandidateQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a candidate, or hand it back when it can be applied right away
    pub fn push(&mut self, candidate: C) -> Option<C> {
        match self {
            CandidateQueue::Pending(queued) => {
                queued.push(candidate);
                None
            }
            CandidateQueue::Applied => Some(candidate),
        }
    }

    /// Take every queued candidate in arrival order
    ///
    /// Only the first call returns anything; afterwards the queue is drained
    /// and [`push`](Self::push) passes candidates through.
    pub fn take_pending(&mut self) -> Vec<C> {
        match std::mem::replace(self, CandidateQueue::Applied) {
            CandidateQueue::Pending(queued) => queued,
            CandidateQueue::Applied => Vec::new(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, CandidateQueue::Applied)
    }

    pub fn len(&self) -> usize {
        match self {
            CandidateQueue::Pending(queued) => queued.len(),
            CandidateQueue::Applied => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_drain_in_arrival_order() {
        let mut queue = CandidateQueue::new();
        assert_eq!(queue.push("c1"), None);
        assert_eq!(queue.push("c2"), None);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.take_pending(), vec!["c1", "c2"]);
        assert!(queue.is_applied());
        assert_eq!(queue.push("c3"), Some("c3"));
    }

    #[test]
    fn test_drain_happens_once() {
        let mut queue = CandidateQueue::new();
        queue.push(1);
        assert_eq!(queue.take_pending(), vec![1]);
        assert!(queue.take_pending().is_empty());
        assert!(queue.is_empty());
    }
}
