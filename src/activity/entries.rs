use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serenity::all::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub user_id: UserId,
    pub quantity: u32,
    pub entered_at: DateTime<Utc>,
}

/// Participation records for one activity, at most one per user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryManager {
    entries: Vec<Entry>,
}

impl EntryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` to the user's entry, creating it if needed. Returns the new total.
    /// Adding zero never creates an entry.
    pub fn add(&mut self, user_id: UserId, quantity: u32, now: DateTime<Utc>) -> u32 {
        if quantity == 0 {
            return self.quantity_of(user_id);
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.user_id == user_id) {
            entry.quantity = entry.quantity.saturating_add(quantity);
            return entry.quantity;
        }
        self.entries.push(Entry {
            user_id,
            quantity,
            entered_at: now,
        });
        quantity
    }

    /// Overwrites the user's quantity; zero removes the entry.
    pub fn set(&mut self, user_id: UserId, quantity: u32, now: DateTime<Utc>) {
        if quantity == 0 {
            self.remove(user_id);
            return;
        }
        match self.entries.iter_mut().find(|e| e.user_id == user_id) {
            Some(entry) => entry.quantity = quantity,
            None => {
                self.add(user_id, quantity, now);
            }
        }
    }

    /// Takes up to `quantity` away. Returns what remains, or `None` if the user had no entry.
    pub fn subtract(&mut self, user_id: UserId, quantity: u32) -> Option<u32> {
        let entry = self.entries.iter_mut().find(|e| e.user_id == user_id)?;
        entry.quantity = entry.quantity.saturating_sub(quantity);
        let remaining = entry.quantity;
        if remaining == 0 {
            self.remove(user_id);
        }
        Some(remaining)
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<Entry> {
        let index = self.entries.iter().position(|e| e.user_id == user_id)?;
        Some(self.entries.remove(index))
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.iter().any(|e| e.user_id == user_id)
    }

    pub fn quantity_of(&self, user_id: UserId) -> u32 {
        self.entries
            .iter()
            .find(|e| e.user_id == user_id)
            .map(|e| e.quantity)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.quantity)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Weighted sample without replacement: each user wins at most once, with
    /// odds proportional to their quantity. Users in `exclude` never win.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        count: usize,
        exclude: &[UserId],
        rng: &mut R,
    ) -> Vec<UserId> {
        let mut pool: Vec<(UserId, u64)> = self
            .entries
            .iter()
            .filter(|e| e.quantity > 0 && !exclude.contains(&e.user_id))
            .map(|e| (e.user_id, u64::from(e.quantity)))
            .collect();

        let mut winners = Vec::with_capacity(count.min(pool.len()));
        while winners.len() < count && !pool.is_empty() {
            let total: u64 = pool.iter().map(|(_, weight)| weight).sum();
            let mut ticket = rng.random_range(0..total);
            let index = pool
                .iter()
                .position(|(_, weight)| {
                    if ticket < *weight {
                        true
                    } else {
                        ticket -= *weight;
                        false
                    }
                })
                .unwrap_or(pool.len() - 1);
            winners.push(pool.swap_remove(index).0);
        }
        winners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn user(id: u64) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn add_merges_quantities_per_user() {
        let now = Utc::now();
        let mut entries = EntryManager::new();
        assert_eq!(entries.add(user(1), 2, now), 2);
        assert_eq!(entries.add(user(1), 3, now), 5);
        entries.add(user(2), 1, now);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries.quantity_of(user(1)), 5);
        assert_eq!(entries.total_weight(), 6);
    }

    #[test]
    fn subtract_removes_empty_entries() {
        let now = Utc::now();
        let mut entries = EntryManager::new();
        entries.add(user(1), 3, now);

        assert_eq!(entries.subtract(user(1), 1), Some(2));
        assert_eq!(entries.subtract(user(1), 5), Some(0));
        assert!(!entries.contains(user(1)));
        assert_eq!(entries.subtract(user(1), 1), None);
    }

    #[test]
    fn adding_nothing_creates_no_entry() {
        let now = Utc::now();
        let mut entries = EntryManager::new();
        assert_eq!(entries.add(user(1), 0, now), 0);
        assert!(entries.is_empty());

        entries.add(user(2), 2, now);
        assert_eq!(entries.add(user(2), 0, now), 2);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn set_zero_removes() {
        let now = Utc::now();
        let mut entries = EntryManager::new();
        entries.set(user(1), 4, now);
        assert_eq!(entries.quantity_of(user(1)), 4);
        entries.set(user(1), 0, now);
        assert!(entries.is_empty());
    }

    #[test]
    fn draw_returns_unique_winners_capped_by_pool() {
        let now = Utc::now();
        let mut entries = EntryManager::new();
        for id in 1..=3 {
            entries.add(user(id), 10, now);
        }
        let mut rng = StdRng::seed_from_u64(7);

        let winners = entries.draw(5, &[], &mut rng);
        assert_eq!(winners.len(), 3);
        let mut sorted = winners.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn draw_skips_excluded_users() {
        let now = Utc::now();
        let mut entries = EntryManager::new();
        entries.add(user(1), 1, now);
        entries.add(user(2), 1, now);
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..20 {
            assert_eq!(entries.draw(1, &[user(1)], &mut rng), vec![user(2)]);
        }
        assert!(entries.draw(1, &[user(1), user(2)], &mut rng).is_empty());
    }

    #[test]
    fn draw_from_empty_pool_is_empty() {
        let entries = EntryManager::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(entries.draw(1, &[], &mut rng).is_empty());
    }

    #[test]
    fn draw_favours_heavier_entries() {
        let now = Utc::now();
        let mut entries = EntryManager::new();
        entries.add(user(1), 99, now);
        entries.add(user(2), 1, now);
        let mut rng = StdRng::seed_from_u64(42);

        let heavy_wins = (0..1000)
            .filter(|_| entries.draw(1, &[], &mut rng) == vec![user(1)])
            .count();
        assert!(heavy_wins > 900, "heavy entry won {heavy_wins} of 1000");
    }
}
