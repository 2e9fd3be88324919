//! Pending chat messages awaiting delivery.

use std::collections::VecDeque;

use parley_types::ChatMessage;

/// A queued message and how many delivery passes it has already missed.
#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub message: ChatMessage,
    pub waited: u32,
}

/// FIFO of accepted-but-undelivered messages.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Pending>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, message: ChatMessage) {
        self.queue.push_back(Pending { message, waited: 0 });
    }

    /// Put a missed message back for the next pass.
    pub fn defer(&mut self, mut pending: Pending) {
        pending.waited += 1;
        self.queue.push_back(pending);
    }

    /// Put a message back for the next pass without counting a miss.
    pub fn hold(&mut self, pending: Pending) {
        self.queue.push_back(pending);
    }

    /// Take everything queued, oldest first, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<Pending> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
