//! Bounded cache of similarity pages, owned by whoever calls `find_similar`.
//!
//! Entries are tagged with the catalog generation they were computed at.
//! Any insert, delete or feature recomputation bumps the generation, and the
//! next lookup against a newer generation drops everything cached.

use std::collections::{HashMap, VecDeque};

use crate::types::EntryId;

use super::SimilarPage;

/// Cache key: reference entry plus the requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimilarityKey {
    pub entry: EntryId,
    pub page: u32,
    pub page_size: u32,
}

/// Least-recently-used cache of [`SimilarPage`]s.
#[derive(Debug)]
pub struct SimilarityCache {
    capacity: usize,
    generation: u64,
    pages: HashMap<SimilarityKey, SimilarPage>,
    order: VecDeque<SimilarityKey>,
    hits: u64,
    misses: u64,
}

impl SimilarityCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            generation: 0,
            pages: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a page computed at `generation`.
    pub fn get(&mut self, key: &SimilarityKey, generation: u64) -> Option<&SimilarPage> {
        self.sync_generation(generation);
        if self.pages.contains_key(key) {
            self.hits += 1;
            self.touch(key);
            self.pages.get(key)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Store a page computed at `generation`.
    pub fn insert(&mut self, key: SimilarityKey, page: SimilarPage, generation: u64) {
        self.sync_generation(generation);
        if self.capacity == 0 || generation < self.generation {
            return;
        }
        if self.pages.insert(key, page).is_some() {
            self.touch(&key);
            return;
        }
        self.order.push_back(key);
        while self.pages.len() > self.capacity {
            match self.order.pop_front() {
                Some(evict) => {
                    self.pages.remove(&evict);
                }
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn sync_generation(&mut self, generation: u64) {
        if generation > self.generation {
            if !self.pages.is_empty() {
                tracing::debug!(
                    "Similarity cache invalidated ({} pages, generation {} -> {})",
                    self.pages.len(),
                    self.generation,
                    generation
                );
            }
            self.clear();
            self.generation = generation;
        }
    }

    fn touch(&mut self, key: &SimilarityKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}
