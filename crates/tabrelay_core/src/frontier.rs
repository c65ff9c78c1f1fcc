use std::collections::{BTreeSet, VecDeque};

use crate::urls::{host_of, normalize_url, resolve_link};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyVisited,
    TooDeep,
    /// Host differs from the seed host. The URL is not marked visited and may
    /// be popped again if another page links to it.
    OffDomain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlStep {
    /// Navigate here. The URL has already been marked visited.
    Visit { url: String, depth: u32 },
    Skip {
        url: String,
        depth: u32,
        reason: SkipReason,
    },
}

/// FIFO work queue plus visited set for one link-crawl run.
///
/// Links are enqueued one depth level below the page they were found on, so
/// pages come out level by level rather than in strict depth-first order.
#[derive(Debug, Clone)]
pub struct CrawlFrontier {
    queue: VecDeque<(String, u32)>,
    visited: BTreeSet<String>,
    base_host: Option<String>,
    max_depth: u32,
    same_domain_only: bool,
}

impl CrawlFrontier {
    pub fn new(seed_url: &str, max_depth: u32, same_domain_only: bool) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back((seed_url.to_string(), 0));
        Self {
            queue,
            visited: BTreeSet::new(),
            base_host: host_of(seed_url),
            max_depth,
            same_domain_only,
        }
    }

    /// Pop the front entry and classify it.
    pub fn pop(&mut self) -> Option<CrawlStep> {
        let (url, depth) = self.queue.pop_front()?;
        let key = normalize_url(&url);

        if self.visited.contains(&key) {
            return Some(CrawlStep::Skip {
                url,
                depth,
                reason: SkipReason::AlreadyVisited,
            });
        }
        if depth > self.max_depth {
            return Some(CrawlStep::Skip {
                url,
                depth,
                reason: SkipReason::TooDeep,
            });
        }
        if self.same_domain_only && host_of(&url) != self.base_host {
            return Some(CrawlStep::Skip {
                url,
                depth,
                reason: SkipReason::OffDomain,
            });
        }

        self.visited.insert(key);
        Some(CrawlStep::Visit { url, depth })
    }

    /// Whether links found on a page at `depth` should be followed.
    pub fn expands(&self, depth: u32) -> bool {
        depth < self.max_depth
    }

    /// Queue links found on `page_url` (at `depth`) one level deeper.
    /// Returns the number of links queued.
    pub fn enqueue_links<I, S>(&mut self, page_url: &str, depth: u32, links: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.expands(depth) {
            return 0;
        }
        let before = self.queue.len();
        for link in links {
            if let Some(url) = resolve_link(link.as_ref(), Some(page_url)) {
                self.queue.push_back((url, depth + 1));
            }
        }
        self.queue.len() - before
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn visited(&self) -> &BTreeSet<String> {
        &self.visited
    }

    pub fn into_visited(self) -> BTreeSet<String> {
        self.visited
    }
}
