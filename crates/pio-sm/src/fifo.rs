use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    Empty,
}

/// Bounded word queue between a state machine and the host.
#[derive(Debug, Clone)]
pub struct Fifo {
    words: VecDeque<u32>,
    capacity: usize,
}

impl Fifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the depth (FIFO join). Like the hardware, contents are discarded.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.words.clear();
        self.capacity = capacity;
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.words.len() >= self.capacity
    }

    pub fn try_push(&mut self, word: u32) -> Result<(), PushError> {
        if self.is_full() {
            return Err(PushError::Full);
        }
        self.words.push_back(word);
        Ok(())
    }

    pub fn try_pop(&mut self) -> Result<u32, PopError> {
        self.words.pop_front().ok_or(PopError::Empty)
    }

    pub fn peek(&self) -> Option<u32> {
        self.words.front().copied()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_and_bounds() {
        let mut fifo = Fifo::new(2);
        assert_eq!(fifo.try_pop(), Err(PopError::Empty));
        fifo.try_push(1).unwrap();
        fifo.try_push(2).unwrap();
        assert_eq!(fifo.try_push(3), Err(PushError::Full));
        assert_eq!(fifo.try_pop(), Ok(1));
        fifo.try_push(3).unwrap();
        assert_eq!(fifo.iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn join_discards_contents() {
        let mut fifo = Fifo::new(4);
        fifo.try_push(7).unwrap();
        fifo.set_capacity(8);
        assert!(fifo.is_empty());
        assert_eq!(fifo.capacity(), 8);
    }
}
