//! Occupancy table of worker sequence numbers.
//!
//! A sequence is occupied from `allocate` until the worker's exit is handled.
//! Freed sequences are handed out again, lowest first, before the table grows.
//! The table never shrinks.

/// Sequence-number bookkeeping, owned by the controller.
#[derive(Debug, Default, Clone)]
pub struct SlotTable {
    occupied: Vec<bool>,
}

impl SlotTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lowest free sequence and marks it occupied.
    pub fn allocate(&mut self) -> usize {
        match self.occupied.iter().position(|taken| !taken) {
            Some(free) => {
                self.occupied[free] = true;
                free
            }
            None => {
                self.occupied.push(true);
                self.occupied.len() - 1
            }
        }
    }

    /// Marks `sequence` free. Freeing a free or unknown sequence is a no-op.
    pub fn free(&mut self, sequence: usize) {
        if let Some(taken) = self.occupied.get_mut(sequence) {
            *taken = false;
        }
    }

    /// True if `sequence` is currently occupied.
    pub fn is_occupied(&self, sequence: usize) -> bool {
        self.occupied.get(sequence).copied().unwrap_or(false)
    }

    /// True when no sequence is occupied.
    pub fn all_free(&self) -> bool {
        !self.occupied.iter().any(|taken| *taken)
    }

    /// Occupied sequences in ascending order.
    pub fn occupied(&self) -> impl Iterator<Item = usize> + '_ {
        self.occupied
            .iter()
            .enumerate()
            .filter_map(|(seq, taken)| taken.then_some(seq))
    }

    /// Number of sequences ever handed out (occupied or not).
    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    /// True if nothing was ever allocated.
    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_grows_in_order() {
        let mut table = SlotTable::new();
        assert_eq!(table.allocate(), 0);
        assert_eq!(table.allocate(), 1);
        assert_eq!(table.allocate(), 2);
        assert_eq!(table.occupied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn reuses_lowest_freed_sequence() {
        let mut table = SlotTable::new();
        for _ in 0..4 {
            table.allocate();
        }
        table.free(2);
        table.free(1);
        assert_eq!(table.allocate(), 1);
        assert_eq!(table.allocate(), 2);
        assert_eq!(table.allocate(), 4);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn allocate_free_allocate_returns_same_sequence() {
        let mut table = SlotTable::new();
        let first = table.allocate();
        table.free(first);
        assert_eq!(table.allocate(), first);
    }

    #[test]
    fn free_is_idempotent_and_ignores_unknown() {
        let mut table = SlotTable::new();
        let seq = table.allocate();
        table.free(seq);
        table.free(seq);
        table.free(99);
        assert!(table.all_free());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn never_hands_out_an_occupied_sequence() {
        let mut table = SlotTable::new();
        let mut live = std::collections::BTreeSet::new();
        // Deterministic churn: allocate three, free every other one, repeat.
        for round in 0..20 {
            for _ in 0..3 {
                let seq = table.allocate();
                assert!(live.insert(seq), "sequence {seq} handed out twice");
            }
            let to_free: Vec<usize> = live.iter().copied().filter(|s| (s + round) % 2 == 0).collect();
            for seq in to_free {
                table.free(seq);
                live.remove(&seq);
            }
            assert_eq!(table.occupied().collect::<Vec<_>>(), live.iter().copied().collect::<Vec<_>>());
        }
    }

    #[test]
    fn all_free_on_empty_table() {
        let table = SlotTable::new();
        assert!(table.all_free());
        assert!(table.is_empty());
        assert!(!table.is_occupied(0));
    }
}
