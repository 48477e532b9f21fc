//! Bounded outbound queue.
//!
//! FIFO with drop-oldest on overflow: a full queue always admits the newest
//! message and evicts the front.

use std::collections::VecDeque;

/// Serialized frames waiting for a connection.
#[derive(Clone, Debug)]
pub struct OutboundQueue {
    capacity: usize,
    items: VecDeque<String>,
}

impl OutboundQueue {
    /// Empty queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Maximum length.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append `frame`, returning the evicted oldest frame if the queue was full.
    pub fn push(&mut self, frame: String) -> Option<String> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(frame);
        evicted
    }

    /// Put frames that were taken out but never delivered back at the front,
    /// in their original order. Returns whatever no longer fits, oldest first.
    pub fn restore(&mut self, frames: Vec<String>) -> Vec<String> {
        for frame in frames.into_iter().rev() {
            self.items.push_front(frame);
        }
        let overflow = self.items.len().saturating_sub(self.capacity);
        self.items.drain(..overflow).collect()
    }

    /// Take everything, oldest first.
    pub fn drain(&mut self) -> Vec<String> {
        self.items.drain(..).collect()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frames(q: &OutboundQueue) -> Vec<&str> {
        q.iter().map(String::as_str).collect()
    }

    #[test]
    fn fifo_order() {
        let mut q = OutboundQueue::new(3);
        assert!(q.push("a".into()).is_none());
        assert!(q.push("b".into()).is_none());
        assert_eq!(q.drain(), vec!["a", "b"]);
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut q = OutboundQueue::new(2);
        let _ = q.push("a".into());
        let _ = q.push("b".into());
        assert_eq!(q.push("c".into()).as_deref(), Some("a"));
        assert_eq!(frames(&q), vec!["b", "c"]);
    }

    #[test]
    fn restore_goes_to_front() {
        let mut q = OutboundQueue::new(5);
        let _ = q.push("later".into());
        let dropped = q.restore(vec!["first".into(), "second".into()]);
        assert!(dropped.is_empty());
        assert_eq!(frames(&q), vec!["first", "second", "later"]);
    }

    #[test]
    fn restore_overflow_drops_oldest() {
        let mut q = OutboundQueue::new(2);
        let _ = q.push("c".into());
        let dropped = q.restore(vec!["a".into(), "b".into()]);
        assert_eq!(dropped, vec!["a"]);
        assert_eq!(frames(&q), vec!["b", "c"]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut q = OutboundQueue::new(0);
        assert_eq!(q.capacity(), 1);
        let _ = q.push("a".into());
        assert_eq!(q.push("b".into()).as_deref(), Some("a"));
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_and_keeps_newest(
            capacity in 1usize..20,
            pushes in proptest::collection::vec("[a-z]{1,4}", 0..60),
        ) {
            let mut q = OutboundQueue::new(capacity);
            let mut evicted = Vec::new();
            for frame in &pushes {
                if let Some(old) = q.push(frame.clone()) {
                    evicted.push(old);
                }
                prop_assert!(q.len() <= capacity);
                prop_assert_eq!(q.iter().last(), Some(frame));
            }

            let keep = pushes.len().min(capacity);
            let expected: Vec<_> = pushes[pushes.len() - keep..].to_vec();
            prop_assert_eq!(q.drain(), expected);
            prop_assert_eq!(evicted, pushes[..pushes.len() - keep].to_vec());
        }
    }
}
