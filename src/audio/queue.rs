//! Bounded FIFO of catalog indices requested out of order (RFID tags,
//! remote selection). Pushing never blocks: a full queue rejects the
//! request and leaves the pending entries untouched.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

pub const SELECTION_QUEUE_CAPACITY: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("selection queue is full, dropped track {0}")]
pub struct QueueFull(pub usize);

#[derive(Debug)]
pub struct SelectionQueue {
    slots: Mutex<VecDeque<usize>>,
    capacity: usize,
}

impl SelectionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, index: usize) -> Result<(), QueueFull> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.len() >= self.capacity {
            return Err(QueueFull(index));
        }
        slots.push_back(index);
        Ok(())
    }

    pub fn pop(&self) -> Option<usize> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for SelectionQueue {
    fn default() -> Self {
        Self::new(SELECTION_QUEUE_CAPACITY)
    }
}
