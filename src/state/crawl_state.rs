//! In-memory state of one seller crawl
//!
//! Owned by a single site crawler; nothing else reads or writes it.

use crate::protocol::BuyerCandidate;
use crate::url::url_key;
use std::collections::{HashSet, VecDeque};
use url::Url;

#[derive(Debug)]
pub struct CrawlState {
    /// Keys of URLs handed out for fetching, successful or not
    visited: HashSet<String>,
    frontier: VecDeque<(Url, u32)>,
    /// Everything ever pushed onto the frontier
    enqueued: HashSet<String>,
    /// Buyer domains in discovery order
    buyer_order: Vec<String>,
    buyer_domains: HashSet<String>,
    uploaded_domains: HashSet<String>,
    pending_buyers: Vec<BuyerCandidate>,
}

impl CrawlState {
    /// Creates a state whose frontier holds only the seed at depth 0
    pub fn new(seed: Url) -> Self {
        let mut state = Self {
            visited: HashSet::new(),
            frontier: VecDeque::new(),
            enqueued: HashSet::new(),
            buyer_order: Vec::new(),
            buyer_domains: HashSet::new(),
            uploaded_domains: HashSet::new(),
            pending_buyers: Vec::new(),
        };
        state.enqueue(seed, 0);
        state
    }

    /// Pushes a URL unless it was seen before; returns true if queued
    ///
    /// `www.` and bare hosts share one [`url_key`].
    pub fn enqueue(&mut self, url: Url, depth: u32) -> bool {
        let key = url_key(&url);
        if self.visited.contains(&key) || !self.enqueued.insert(key) {
            return false;
        }
        self.frontier.push_back((url, depth));
        true
    }

    /// Pops up to `limit` fetchable URLs and marks them visited
    ///
    /// Entries already visited or deeper than `max_depth` are dropped on the way.
    pub fn next_batch(&mut self, limit: usize, max_depth: u32) -> Vec<(Url, u32)> {
        let mut batch = Vec::with_capacity(limit.min(self.frontier.len()));
        while batch.len() < limit {
            let Some((url, depth)) = self.frontier.pop_front() else {
                break;
            };
            if depth > max_depth {
                continue;
            }
            if !self.visited.insert(url_key(&url)) {
                continue;
            }
            batch.push((url, depth));
        }
        batch
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    /// Discards every queued URL
    pub fn clear_frontier(&mut self) {
        self.frontier.clear();
    }

    /// Records a buyer domain; returns true the first time it is seen
    pub fn record_buyer(&mut self, domain: &str) -> bool {
        if !self.buyer_domains.insert(domain.to_string()) {
            return false;
        }
        self.buyer_order.push(domain.to_string());
        self.pending_buyers.push(BuyerCandidate::new(domain));
        true
    }

    /// Takes a full batch of pending buyers once `batch_size` are waiting
    pub fn take_full_batch(&mut self, batch_size: usize) -> Option<Vec<BuyerCandidate>> {
        if batch_size == 0 || self.pending_buyers.len() < batch_size {
            return None;
        }
        Some(self.pending_buyers.drain(..batch_size).collect())
    }

    /// Takes whatever is pending, possibly nothing
    pub fn take_pending(&mut self) -> Vec<BuyerCandidate> {
        std::mem::take(&mut self.pending_buyers)
    }

    pub fn mark_uploaded<'a, I>(&mut self, domains: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.uploaded_domains
            .extend(domains.into_iter().map(str::to_string));
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded_domains.len()
    }

    /// Buyer domains in the order they were discovered
    pub fn buyers(&self) -> &[String] {
        &self.buyer_order
    }

    pub fn buyer_count(&self) -> usize {
        self.buyer_order.len()
    }
}
