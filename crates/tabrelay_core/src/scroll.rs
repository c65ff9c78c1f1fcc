use std::ops::Range;

/// Consecutive unchanged extraction rounds after which scrolling stops.
pub const STAGNATION_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollObservation {
    /// The list changed size. `new_items` indexes the delta to store and report,
    /// already clipped to the item cap.
    Grew { new_items: Range<usize> },
    /// Nothing new this round; `rounds` consecutive so far.
    Unchanged { rounds: u32 },
    /// Threshold reached; stop scrolling.
    Stagnant,
}

/// Tracks the rolling extraction size for infinite-scroll pages.
///
/// Each round the agent returns the full list seen so far. Only the part beyond
/// the previous extraction is new.
#[derive(Debug, Clone)]
pub struct ScrollTracker {
    max_items: usize,
    last_count: usize,
    collected: usize,
    unchanged_rounds: u32,
}

impl ScrollTracker {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items,
            last_count: 0,
            collected: 0,
            unchanged_rounds: 0,
        }
    }

    pub fn observe(&mut self, extracted: usize) -> ScrollObservation {
        let start = self.collected.min(extracted);
        let end = extracted.min(self.max_items).max(start);

        // A list that shrinks or oscillates without surfacing anything new
        // counts as unchanged too.
        if extracted == self.last_count || start == end {
            self.last_count = extracted;
            self.unchanged_rounds += 1;
            if self.unchanged_rounds >= STAGNATION_THRESHOLD {
                return ScrollObservation::Stagnant;
            }
            return ScrollObservation::Unchanged {
                rounds: self.unchanged_rounds,
            };
        }

        self.unchanged_rounds = 0;
        self.last_count = extracted;
        self.collected = end;
        ScrollObservation::Grew {
            new_items: start..end,
        }
    }

    /// Items reported so far, never more than the cap.
    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn last_count(&self) -> usize {
        self.last_count
    }

    pub fn is_full(&self) -> bool {
        self.collected >= self.max_items
    }
}
