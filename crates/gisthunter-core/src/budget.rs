/// Per-run cap on listing requests
///
/// `consumed` never exceeds `max`; once exhausted the run just ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBudget {
    max: u32,
    consumed: u32,
}

impl RequestBudget {
    pub fn new(max: u32) -> Self {
        Self { max, consumed: 0 }
    }

    /// Take one request from the budget, `false` if nothing is left
    pub fn try_consume(&mut self) -> bool {
        if self.consumed < self.max {
            self.consumed += 1;
            true
        } else {
            false
        }
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.max
    }
}
