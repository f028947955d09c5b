//! FIFO prompt queue with two delivery modes.
//!
//! Multiple producers push; the session worker is the single consumer.
//! `Interrupt` entries go to the front so they run next, while entries
//! already queued behind the active turn are preserved.

use std::collections::VecDeque;

use turn_protocol::conversation::Attachment;

/// Whether a submission waits its turn or preempts the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    #[default]
    Queue,
    Interrupt,
}

/// One pending submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptQueueEntry {
    /// Monotonic submission sequence number; also the waiter key.
    pub seq: u64,
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    pub mode: DeliveryMode,
}

#[derive(Debug, Default)]
pub struct PromptQueue {
    entries: VecDeque<PromptQueueEntry>,
    next_seq: u64,
}

impl PromptQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a submission and return its sequence number.
    pub fn push(
        &mut self,
        prompt: impl Into<String>,
        attachments: Vec<Attachment>,
        mode: DeliveryMode,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = PromptQueueEntry {
            seq,
            prompt: prompt.into(),
            attachments,
            mode,
        };
        match mode {
            DeliveryMode::Queue => self.entries.push_back(entry),
            DeliveryMode::Interrupt => self.entries.push_front(entry),
        }
        seq
    }

    pub fn pop(&mut self) -> Option<PromptQueueEntry> {
        self.entries.pop_front()
    }

    /// Remove and return everything still pending, oldest first.
    pub fn drain(&mut self) -> Vec<PromptQueueEntry> {
        self.entries.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{DeliveryMode, PromptQueue};

    #[test]
    fn queue_mode_drains_in_submission_order() {
        let mut queue = PromptQueue::new();
        let first = queue.push("p1", Vec::new(), DeliveryMode::Queue);
        let second = queue.push("p2", Vec::new(), DeliveryMode::Queue);

        assert!(first < second);
        assert_eq!(queue.pop().expect("p1").prompt, "p1");
        assert_eq!(queue.pop().expect("p2").prompt, "p2");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn interrupt_entries_run_next_without_dropping_queued_ones() {
        let mut queue = PromptQueue::new();
        queue.push("queued-1", Vec::new(), DeliveryMode::Queue);
        queue.push("queued-2", Vec::new(), DeliveryMode::Queue);
        queue.push("urgent", Vec::new(), DeliveryMode::Interrupt);

        assert_eq!(queue.pop().expect("urgent").prompt, "urgent");
        assert_eq!(queue.pop().expect("queued-1").prompt, "queued-1");
        assert_eq!(queue.pop().expect("queued-2").prompt, "queued-2");
    }

    #[test]
    fn sequence_numbers_stay_monotonic_across_modes() {
        let mut queue = PromptQueue::new();
        let a = queue.push("a", Vec::new(), DeliveryMode::Queue);
        let b = queue.push("b", Vec::new(), DeliveryMode::Interrupt);
        let c = queue.push("c", Vec::new(), DeliveryMode::Queue);
        assert!(a < b && b < c);
    }

    #[test]
    fn drain_empties_the_queue_oldest_first() {
        let mut queue = PromptQueue::new();
        queue.push("a", Vec::new(), DeliveryMode::Queue);
        queue.push("b", Vec::new(), DeliveryMode::Queue);

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].prompt, "a");
        assert!(queue.is_empty());
    }
}
