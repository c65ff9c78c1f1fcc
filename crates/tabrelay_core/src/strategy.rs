use std::fmt;

use serde::{Deserialize, Serialize};

/// Traversal algorithm used to collect items across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Pagination,
    InfiniteScroll,
    #[serde(rename = "depth", alias = "depth_first")]
    DepthFirst,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Pagination => write!(f, "pagination"),
            Strategy::InfiniteScroll => write!(f, "infinite_scroll"),
            Strategy::DepthFirst => write!(f, "depth"),
        }
    }
}

/// Why a traversal stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The item cap was reached.
    Done,
    /// Pagination ran out of pages or the next-page control disappeared.
    Exhausted,
    /// Infinite scroll stopped producing new items.
    Stagnant,
    /// The crawl frontier emptied.
    QueueEmpty,
}
