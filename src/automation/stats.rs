//! Per-session purchase statistics.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

use crate::automation::items::ItemRegistry;

/// Purchases of one tracked item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemTally {
    pub name: String,
    pub price: u64,
    pub purchased: u32,
}

impl ItemTally {
    pub fn cost(&self) -> u64 {
        self.price * self.purchased as u64
    }
}

/// Running statistics of one session.
///
/// Owned by the worker thread; the GUI only sees snapshots sent as events.
#[derive(Clone, Debug)]
pub struct SessionStats {
    started_at: DateTime<Local>,
    started: Instant,
    refresh_count: u32,
    refresh_cost: u32,
    items: Vec<ItemTally>,
}

impl SessionStats {
    pub fn new(registry: &ItemRegistry, refresh_cost: u32) -> Self {
        let items = registry
            .items()
            .iter()
            .map(|item| ItemTally {
                name: item.name.clone(),
                price: item.price,
                purchased: 0,
            })
            .collect();
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            refresh_count: 0,
            refresh_cost,
            items,
        }
    }

    /// Counts one purchase of the item at registry index `index`.
    pub fn record_purchase(&mut self, index: usize) {
        if let Some(tally) = self.items.get_mut(index) {
            tally.purchased += 1;
        }
    }

    pub fn record_refresh(&mut self) {
        self.refresh_count += 1;
    }

    pub fn refresh_count(&self) -> u32 {
        self.refresh_count
    }

    pub fn purchased(&self, index: usize) -> u32 {
        self.items.get(index).map_or(0, |tally| tally.purchased)
    }

    pub fn items(&self) -> &[ItemTally] {
        &self.items
    }

    /// Total spent on items: Σ price × purchased.
    pub fn total_cost(&self) -> u64 {
        self.items.iter().map(ItemTally::cost).sum()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Freezes the statistics into the record persisted at session end.
    pub fn finish(&self) -> SessionRecord {
        SessionRecord {
            started_at: self.started_at,
            duration: self.elapsed(),
            refresh_count: self.refresh_count,
            refresh_currency_spent: self.refresh_count as u64 * self.refresh_cost as u64,
            items: self.items.clone(),
        }
    }
}

/// Final, immutable statistics of a finished session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRecord {
    pub started_at: DateTime<Local>,
    pub duration: Duration,
    pub refresh_count: u32,
    pub refresh_currency_spent: u64,
    pub items: Vec<ItemTally>,
}

impl SessionRecord {
    pub fn total_cost(&self) -> u64 {
        self.items.iter().map(ItemTally::cost).sum()
    }

    pub fn purchased(&self, name: &str) -> Option<u32> {
        self.items
            .iter()
            .find(|tally| tally.name == name)
            .map(|tally| tally.purchased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::items::TrackedItem;
    use image::GrayImage;

    fn registry() -> ItemRegistry {
        ItemRegistry::new(vec![
            TrackedItem {
                name: "Covenant bookmark".to_string(),
                template: GrayImage::new(1, 1),
                price: 184_000,
            },
            TrackedItem {
                name: "Mystic medal".to_string(),
                template: GrayImage::new(1, 1),
                price: 280_000,
            },
        ])
    }

    #[test]
    fn test_total_cost_tracks_purchases() {
        let mut stats = SessionStats::new(&registry(), 3);
        assert_eq!(stats.total_cost(), 0);

        stats.record_purchase(0);
        stats.record_purchase(0);
        stats.record_purchase(1);
        let expected: u64 = stats.items().iter().map(|t| t.price * t.purchased as u64).sum();
        assert_eq!(stats.total_cost(), expected);
        assert_eq!(stats.total_cost(), 2 * 184_000 + 280_000);
    }

    #[test]
    fn test_unknown_index_is_ignored() {
        let mut stats = SessionStats::new(&registry(), 3);
        stats.record_purchase(7);
        assert_eq!(stats.total_cost(), 0);
        assert_eq!(stats.purchased(7), 0);
    }

    #[test]
    fn test_finish_computes_refresh_spend() {
        let mut stats = SessionStats::new(&registry(), 3);
        for _ in 0..4 {
            stats.record_refresh();
        }
        stats.record_purchase(1);

        let record = stats.finish();
        assert_eq!(record.refresh_count, 4);
        assert_eq!(record.refresh_currency_spent, 12);
        assert_eq!(record.total_cost(), 280_000);
        assert_eq!(record.purchased("Mystic medal"), Some(1));
        assert_eq!(record.purchased("Unknown"), None);
    }
}
