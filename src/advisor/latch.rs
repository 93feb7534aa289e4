/// Count-down latch for one tick: opens once every asynchronous computation
/// dispatched for that tick has reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickLatch {
    remaining: usize,
}

impl TickLatch {
    pub fn new(count: usize) -> Self {
        Self { remaining: count }
    }

    /// Record one completion. Returns `true` when this completion opened the
    /// latch. Extra completions after opening are ignored.
    pub fn count_down(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    pub fn is_open(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_every_completion() {
        let mut latch = TickLatch::new(2);
        assert!(!latch.is_open());
        assert!(!latch.count_down());
        assert!(latch.count_down());
        assert!(latch.is_open());
        assert!(!latch.count_down());
        assert_eq!(latch.remaining(), 0);
    }

    #[test]
    fn zero_is_open_immediately() {
        assert!(TickLatch::new(0).is_open());
    }
}
