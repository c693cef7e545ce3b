// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Reward catalog and per-location inventory.
//!
//! Stock is tracked per `(reward, location)` in an [`AtomicU32`] so that
//! concurrent redemptions of the same reward never read-then-write the
//! count. A reward's `inventory_count` is derived: it is recomputed from
//! the location records after every stock mutation and never set directly.
//!
//! A reward with no inventory records at all is unlimited.

use crate::LoyaltyError;
use crate::base::{LocationCode, RewardId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCatalogItem {
    pub reward_id: RewardId,
    pub name: String,
    pub points_required: u64,
    #[serde(default = "default_true")]
    pub active: bool,
    /// `0` means unlimited.
    #[serde(default)]
    pub max_redemptions_per_customer: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub delivery_method: String,
    #[serde(default)]
    pub available_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub available_until: Option<DateTime<Utc>>,
    /// Sum of stock across all locations. Derived.
    #[serde(default, skip_deserializing)]
    pub inventory_count: u32,
}

fn default_true() -> bool {
    true
}

impl RewardCatalogItem {
    /// Active and inside the availability window at `now`.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.available_from.is_none_or(|from| from <= now)
            && self.available_until.is_none_or(|until| now <= until)
    }
}

/// Stock for one reward at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub reward_id: RewardId,
    #[serde(default)]
    pub location_code: LocationCode,
    #[serde(default)]
    pub location_name: String,
    pub stock_available: u32,
    #[serde(default)]
    pub threshold_alert: u32,
}

#[derive(Debug)]
struct LocationMeta {
    name: String,
    threshold_alert: u32,
}

#[derive(Debug)]
struct StockSlot {
    meta: Mutex<LocationMeta>,
    stock: AtomicU32,
}

impl StockSlot {
    fn new(name: String, threshold_alert: u32, stock: u32) -> Self {
        Self {
            meta: Mutex::new(LocationMeta {
                name,
                threshold_alert,
            }),
            stock: AtomicU32::new(stock),
        }
    }

    /// Decrements by one unless already at zero. Returns the new stock.
    fn take_one(&self) -> Option<u32> {
        self.stock
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| s.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    fn put(&self, quantity: u32) {
        // Saturating, so the closure never fails.
        let _ = self
            .stock
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some(s.saturating_add(quantity))
            });
    }
}

/// Whether a redemption took a unit of stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// One unit taken; `remaining` is the location's stock afterwards.
    Reserved { remaining: u32 },
    /// The reward carries no inventory records.
    Unlimited,
}

#[derive(Debug, Default)]
pub struct Catalog {
    rewards: DashMap<RewardId, RewardCatalogItem>,
    inventory: DashMap<(RewardId, LocationCode), Arc<StockSlot>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a catalog item. The supplied `inventory_count`
    /// is ignored and recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::InvalidAmount`] for a reward that costs no
    /// points.
    pub fn upsert_reward(&self, item: RewardCatalogItem) -> Result<(), LoyaltyError> {
        if item.points_required == 0 {
            return Err(LoyaltyError::InvalidAmount);
        }
        let reward_id = item.reward_id;
        self.rewards.insert(reward_id, item);
        self.recompute(reward_id);
        Ok(())
    }

    pub fn reward(&self, reward_id: RewardId) -> Option<RewardCatalogItem> {
        self.rewards.get(&reward_id).map(|r| r.clone())
    }

    /// All catalog items ordered by ascending cost.
    pub fn rewards(&self) -> Vec<RewardCatalogItem> {
        let mut items: Vec<RewardCatalogItem> =
            self.rewards.iter().map(|r| r.value().clone()).collect();
        items.sort_by_key(|r| (r.points_required, r.reward_id));
        items
    }

    /// Sets the stock of a location outright, creating the record if needed.
    pub fn set_stock(&self, record: InventoryRecord) {
        let key = (record.reward_id, record.location_code.clone());
        match self.inventory.entry(key) {
            Entry::Occupied(slot) => {
                let slot = slot.get();
                let mut meta = slot.meta.lock();
                meta.name = record.location_name;
                meta.threshold_alert = record.threshold_alert;
                slot.stock.store(record.stock_available, Ordering::Release);
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(StockSlot::new(
                    record.location_name,
                    record.threshold_alert,
                    record.stock_available,
                )));
            }
        }
        self.recompute(record.reward_id);
    }

    /// Adds `quantity` units at a location, creating the record if needed.
    pub fn restock(&self, reward_id: RewardId, location: &LocationCode, quantity: u32) {
        let slot = self
            .inventory
            .entry((reward_id, location.clone()))
            .or_insert_with(|| Arc::new(StockSlot::new(location.to_string(), 0, 0)))
            .clone();
        slot.put(quantity);
        self.recompute(reward_id);
    }

    pub fn has_inventory(&self, reward_id: RewardId) -> bool {
        self.inventory.iter().any(|slot| slot.key().0 == reward_id)
    }

    /// Takes one unit of stock for a redemption.
    ///
    /// # Errors
    ///
    /// [`LoyaltyError::OutOfStock`] if the reward has inventory records but
    /// none with stock at `location`.
    pub fn reserve(
        &self,
        reward_id: RewardId,
        location: &LocationCode,
    ) -> Result<Reservation, LoyaltyError> {
        if !self.has_inventory(reward_id) {
            return Ok(Reservation::Unlimited);
        }

        let out_of_stock = || LoyaltyError::OutOfStock {
            reward: reward_id,
            location: location.clone(),
        };
        let slot = self
            .inventory
            .get(&(reward_id, location.clone()))
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(out_of_stock)?;
        let remaining = slot.take_one().ok_or_else(out_of_stock)?;

        let threshold = slot.meta.lock().threshold_alert;
        if remaining <= threshold {
            warn!(
                reward_id = %reward_id,
                location = %location,
                remaining,
                threshold,
                "reward stock at or below alert threshold"
            );
        }
        self.recompute(reward_id);
        Ok(Reservation::Reserved { remaining })
    }

    /// Returns a previously reserved unit.
    pub fn release(&self, reward_id: RewardId, location: &LocationCode) {
        self.restock(reward_id, location, 1);
    }

    /// Per-location records for a reward, ordered by location code.
    pub fn inventory(&self, reward_id: RewardId) -> Vec<InventoryRecord> {
        let mut records: Vec<InventoryRecord> = self
            .inventory
            .iter()
            .filter(|slot| slot.key().0 == reward_id)
            .map(|slot| {
                let meta = slot.meta.lock();
                InventoryRecord {
                    reward_id,
                    location_code: slot.key().1.clone(),
                    location_name: meta.name.clone(),
                    stock_available: slot.stock.load(Ordering::Acquire),
                    threshold_alert: meta.threshold_alert,
                }
            })
            .collect();
        records.sort_by(|a, b| a.location_code.cmp(&b.location_code));
        records
    }

    /// Recomputes `inventory_count` from the location records.
    ///
    /// The sum is taken while holding the catalog entry, so concurrent
    /// recomputes publish in order and the last one wins with a fresh sum.
    fn recompute(&self, reward_id: RewardId) {
        let Some(mut item) = self.rewards.get_mut(&reward_id) else {
            return;
        };
        let total: u64 = self
            .inventory
            .iter()
            .filter(|slot| slot.key().0 == reward_id)
            .map(|slot| u64::from(slot.stock.load(Ordering::Acquire)))
            .sum();
        item.inventory_count = u32::try_from(total).unwrap_or(u32::MAX);
        debug!(reward_id = %reward_id, inventory_count = item.inventory_count, "inventory recomputed");
    }

    /// Available rewards whose cost lies in `(old_balance, new_balance]`.
    pub fn newly_affordable(
        &self,
        old_balance: u64,
        new_balance: u64,
        now: DateTime<Utc>,
    ) -> Vec<RewardCatalogItem> {
        self.rewards()
            .into_iter()
            .filter(|r| r.is_available(now))
            .filter(|r| old_balance < r.points_required && r.points_required <= new_balance)
            .collect()
    }

    /// Cheapest available reward the balance cannot yet cover.
    pub fn next_unaffordable(&self, balance: u64, now: DateTime<Utc>) -> Option<RewardCatalogItem> {
        self.rewards()
            .into_iter()
            .find(|r| r.is_available(now) && r.points_required > balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::thread;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn item(id: u32, cost: u64) -> RewardCatalogItem {
        RewardCatalogItem {
            reward_id: RewardId(id),
            name: format!("reward-{id}"),
            points_required: cost,
            active: true,
            max_redemptions_per_customer: 0,
            category: "data".into(),
            delivery_method: "pickup".into(),
            available_from: None,
            available_until: None,
            inventory_count: 999,
        }
    }

    fn stock(id: u32, location: &str, count: u32) -> InventoryRecord {
        InventoryRecord {
            reward_id: RewardId(id),
            location_code: LocationCode::new(location),
            location_name: location.to_string(),
            stock_available: count,
            threshold_alert: 1,
        }
    }

    #[test]
    fn inventory_count_is_derived() {
        let catalog = Catalog::new();
        catalog.upsert_reward(item(1, 100)).unwrap();
        assert_eq!(catalog.reward(RewardId(1)).unwrap().inventory_count, 0);

        catalog.set_stock(stock(1, "GLOBAL", 3));
        catalog.set_stock(stock(1, "NBO", 2));
        assert_eq!(catalog.reward(RewardId(1)).unwrap().inventory_count, 5);

        catalog.set_stock(stock(1, "NBO", 0));
        assert_eq!(catalog.reward(RewardId(1)).unwrap().inventory_count, 3);
    }

    #[test]
    fn reserve_without_records_is_unlimited() {
        let catalog = Catalog::new();
        catalog.upsert_reward(item(1, 100)).unwrap();
        assert_eq!(
            catalog.reserve(RewardId(1), &LocationCode::global()),
            Ok(Reservation::Unlimited)
        );
    }

    #[test]
    fn reserve_floors_at_zero() {
        let catalog = Catalog::new();
        catalog.upsert_reward(item(1, 100)).unwrap();
        catalog.set_stock(stock(1, "GLOBAL", 1));

        let global = LocationCode::global();
        assert_eq!(
            catalog.reserve(RewardId(1), &global),
            Ok(Reservation::Reserved { remaining: 0 })
        );
        assert_eq!(
            catalog.reserve(RewardId(1), &global),
            Err(LoyaltyError::OutOfStock {
                reward: RewardId(1),
                location: global.clone()
            })
        );
        assert_eq!(catalog.inventory(RewardId(1))[0].stock_available, 0);
    }

    #[test]
    fn reserve_at_unknown_location_is_out_of_stock() {
        let catalog = Catalog::new();
        catalog.upsert_reward(item(1, 100)).unwrap();
        catalog.set_stock(stock(1, "NBO", 4));
        assert!(matches!(
            catalog.reserve(RewardId(1), &LocationCode::new("MSA")),
            Err(LoyaltyError::OutOfStock { .. })
        ));
    }

    #[test]
    fn release_restores_stock() {
        let catalog = Catalog::new();
        catalog.upsert_reward(item(1, 100)).unwrap();
        catalog.set_stock(stock(1, "NBO", 1));
        let nbo = LocationCode::new("NBO");
        catalog.reserve(RewardId(1), &nbo).unwrap();
        catalog.release(RewardId(1), &nbo);
        assert_eq!(catalog.reward(RewardId(1)).unwrap().inventory_count, 1);
    }

    #[test]
    fn concurrent_reservations_never_oversell() {
        let catalog = Arc::new(Catalog::new());
        catalog.upsert_reward(item(1, 10)).unwrap();
        catalog.set_stock(stock(1, "GLOBAL", 25));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                thread::spawn(move || {
                    let global = LocationCode::global();
                    (0..10)
                        .filter(|_| catalog.reserve(RewardId(1), &global).is_ok())
                        .count()
                })
            })
            .collect();
        let reserved: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(reserved, 25);
        assert_eq!(catalog.reward(RewardId(1)).unwrap().inventory_count, 0);
    }

    #[test]
    fn free_reward_is_refused() {
        let catalog = Catalog::new();
        assert_eq!(
            catalog.upsert_reward(item(1, 0)),
            Err(LoyaltyError::InvalidAmount)
        );
        assert!(catalog.reward(RewardId(1)).is_none());
    }

    #[test]
    fn availability_window() {
        let mut reward = item(1, 10);
        reward.available_from = Some(now() + Duration::days(1));
        assert!(!reward.is_available(now()));
        reward.available_from = Some(now() - Duration::days(1));
        reward.available_until = Some(now() - Duration::hours(1));
        assert!(!reward.is_available(now()));
        reward.available_until = None;
        assert!(reward.is_available(now()));
        reward.active = false;
        assert!(!reward.is_available(now()));
    }

    #[test]
    fn affordability_queries() {
        let catalog = Catalog::new();
        catalog.upsert_reward(item(1, 50)).unwrap();
        catalog.upsert_reward(item(2, 100)).unwrap();
        catalog.upsert_reward(item(3, 200)).unwrap();
        let mut inactive = item(4, 80);
        inactive.active = false;
        catalog.upsert_reward(inactive).unwrap();

        let unlocked: Vec<RewardId> = catalog
            .newly_affordable(40, 120, now())
            .into_iter()
            .map(|r| r.reward_id)
            .collect();
        assert_eq!(unlocked, vec![RewardId(1), RewardId(2)]);

        assert_eq!(
            catalog.next_unaffordable(120, now()).map(|r| r.reward_id),
            Some(RewardId(3))
        );
        assert!(catalog.next_unaffordable(500, now()).is_none());
    }
}
