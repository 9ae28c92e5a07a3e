use std::collections::BTreeMap;

/// Identifies one queued dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueueFull {
    pub capacity: usize,
}

impl std::fmt::Display for QueueFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dispatch queue is full (capacity {})", self.capacity)
    }
}

impl std::error::Error for QueueFull {}

/// Per-frame limit on how many items may leave a [`DispatchQueue`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DispatchBudget {
    remaining: usize,
}

impl DispatchBudget {
    pub fn new(items: usize) -> Self {
        Self { remaining: items }
    }

    pub fn unlimited() -> Self {
        Self {
            remaining: usize::MAX,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn try_take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// Ordered queue of pending dispatches.
///
/// Lower priority values leave first; equal priorities leave in insertion
/// order. Cancelling or reprioritizing a ticket never reorders the others.
#[derive(Debug)]
pub struct DispatchQueue<T> {
    next_ticket: u64,
    order: BTreeMap<(i64, Ticket), T>,
    priorities: BTreeMap<Ticket, i64>,
    capacity: Option<usize>,
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self {
            next_ticket: 0,
            order: BTreeMap::new(),
            priorities: BTreeMap::new(),
            capacity: None,
        }
    }
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, ticket: Ticket) -> bool {
        self.priorities.contains_key(&ticket)
    }

    pub fn push(&mut self, priority: i64, item: T) -> Result<Ticket, QueueFull> {
        if let Some(capacity) = self.capacity
            && self.order.len() >= capacity
        {
            return Err(QueueFull { capacity });
        }
        let ticket = Ticket(self.next_ticket);
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.order.insert((priority, ticket), item);
        self.priorities.insert(ticket, priority);
        Ok(ticket)
    }

    /// Removes a queued item, handing it back to the caller.
    pub fn cancel(&mut self, ticket: Ticket) -> Option<T> {
        let priority = self.priorities.remove(&ticket)?;
        self.order.remove(&(priority, ticket))
    }

    pub fn pop(&mut self) -> Option<(Ticket, T)> {
        let ((_, ticket), item) = self.order.pop_first()?;
        self.priorities.remove(&ticket);
        Some((ticket, item))
    }

    /// Pops items in order until the queue or the budget runs out.
    pub fn drain_within(&mut self, budget: &mut DispatchBudget) -> Vec<(Ticket, T)> {
        let mut out = Vec::new();
        while !self.order.is_empty() && budget.try_take() {
            if let Some(next) = self.pop() {
                out.push(next);
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (Ticket, &T)> {
        self.order.iter().map(|((_, ticket), item)| (*ticket, item))
    }
}
