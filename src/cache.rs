//! Single-slot analytics cache.
//!
//! The slot is either fresh (holds a bundle) or stale (holds nothing). Each
//! invalidation bumps a generation counter; a refill is accepted only for the
//! generation the reader observed before loading the roster, so a bundle
//! computed from an older roster can never land on top of a newer mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::AnalyticsBundle;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnalytics {
    pub bundle: AnalyticsBundle,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheState {
    Fresh(CachedAnalytics),
    Stale { generation: i64 },
}

#[allow(async_fn_in_trait)]
pub trait AnalyticsSlot {
    async fn read_slot(&self) -> Result<CacheState>;

    /// Stores `value` if nothing invalidated the slot since `generation` was
    /// read. Returns whether the value was stored.
    async fn fill_slot(&self, generation: i64, value: &CachedAnalytics) -> Result<bool>;

    async fn invalidate_slot(&self) -> Result<()>;
}

/// In-process slot state; backends that keep the slot in memory embed this.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    generation: i64,
    payload: Option<CachedAnalytics>,
}

impl MemorySlot {
    pub fn state(&self) -> CacheState {
        match &self.payload {
            Some(value) => CacheState::Fresh(value.clone()),
            None => CacheState::Stale {
                generation: self.generation,
            },
        }
    }

    pub fn fill(&mut self, generation: i64, value: &CachedAnalytics) -> bool {
        if generation != self.generation {
            return false;
        }
        self.payload = Some(value.clone());
        true
    }

    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.payload = None;
    }
}
