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

//! Loyalty account management.
//!
//! A [`LoyaltyAccount`] owns the customer's summary (balance, lifetime
//! totals, tier) together with the customer's ledger entries, all behind a
//! single mutex. Every balance change appends an entry under that lock, so
//! the summary and the ledger can never be observed out of step.
//!
//! # Example
//!
//! ```
//! use loyalty_ledger_rs::{CustomerId, LoyaltyAccount, Tier};
//!
//! let account = LoyaltyAccount::new(CustomerId(1), "254700000001");
//! assert_eq!(account.balance(), 0);
//! assert_eq!(account.tier(), Tier::Bronze);
//! ```

use crate::base::{CustomerId, EntryId, RedemptionId, RewardId};
use crate::ledger::{Correlation, EntryType, LedgerEntry};
use crate::tier::{Tier, TierPerks, TierResolver, TierStatus};
use crate::LoyaltyError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashMap;

/// Converts a point amount into a signed ledger delta.
///
/// Amounts that do not fit an `i64` are rejected with
/// [`LoyaltyError::InvalidAmount`].
pub(crate) fn ledger_delta(points: u64) -> Result<i64, LoyaltyError> {
    i64::try_from(points).map_err(|_| LoyaltyError::InvalidAmount)
}

fn checked_credit(current: u64, points: u64) -> Result<u64, LoyaltyError> {
    current.checked_add(points).ok_or(LoyaltyError::InvalidAmount)
}

#[derive(Debug)]
pub(crate) struct AccountData {
    customer_id: CustomerId,
    phone_number: String,
    balance: u64,
    total_earned: u64,
    total_redeemed: u64,
    tier: Tier,
    tier_status: TierStatus,
    last_earned_at: Option<DateTime<Utc>>,
    /// Ledger entries in creation order.
    entries: Vec<LedgerEntry>,
    redemptions: Vec<RedemptionId>,
    /// Live (not rejected) redemptions per reward, for per-customer caps.
    redeemed_per_reward: HashMap<RewardId, u32>,
}

impl AccountData {
    fn new(customer_id: CustomerId, phone_number: String) -> Self {
        Self {
            customer_id,
            phone_number,
            balance: 0,
            total_earned: 0,
            total_redeemed: 0,
            tier: Tier::Bronze,
            tier_status: TierStatus::New,
            last_earned_at: None,
            entries: Vec::new(),
            redemptions: Vec::new(),
            redeemed_per_reward: HashMap::new(),
        }
    }

    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.entries.last().map_or(0, |e| e.balance_after),
            self.balance,
            "Invariant violated: balance differs from last ledger entry"
        );
        debug_assert_eq!(
            self.replay_balance(),
            i128::from(self.balance),
            "Invariant violated: ledger replay differs from balance"
        );
    }

    /// Sum of every entry's points, in creation order.
    pub(crate) fn replay_balance(&self) -> i128 {
        self.entries.iter().map(|e| i128::from(e.points)).sum()
    }

    pub(crate) fn balance(&self) -> u64 {
        self.balance
    }

    pub(crate) fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub(crate) fn tier(&self) -> Tier {
        self.tier
    }

    pub(crate) fn tier_status(&self) -> TierStatus {
        self.tier_status
    }

    pub(crate) fn redemption_count(&self, reward_id: RewardId) -> u32 {
        self.redeemed_per_reward.get(&reward_id).copied().unwrap_or(0)
    }

    pub(crate) fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub(crate) fn redemptions(&self) -> &[RedemptionId] {
        &self.redemptions
    }

    fn append(
        &mut self,
        id: EntryId,
        entry_type: EntryType,
        points: i64,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        correlation: Correlation,
    ) -> LedgerEntry {
        let entry = LedgerEntry {
            id,
            customer_id: self.customer_id,
            phone_number: self.phone_number.clone(),
            entry_type,
            points,
            balance_after: self.balance,
            created_at: now,
            expires_at,
            is_expired: false,
            correlation,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Re-derives tier and status from the current balance.
    pub(crate) fn apply_tier(&mut self, tiers: &TierResolver) {
        if let Some(assignment) = tiers.resolve(self.balance) {
            self.tier = assignment.tier;
            self.tier_status = assignment.status;
        }
    }

    /// Credits earned points and appends an `Earned` entry.
    ///
    /// Fails with [`LoyaltyError::InvalidAmount`], leaving the account
    /// untouched, if the amount or the resulting totals are out of range.
    pub(crate) fn earn(
        &mut self,
        id: EntryId,
        points: u64,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        correlation: Correlation,
        tiers: &TierResolver,
    ) -> Result<LedgerEntry, LoyaltyError> {
        let delta = ledger_delta(points)?;
        let balance = checked_credit(self.balance, points)?;
        let total_earned = checked_credit(self.total_earned, points)?;

        self.balance = balance;
        self.total_earned = total_earned;
        self.last_earned_at = Some(now);
        let entry = self.append(
            id,
            EntryType::Earned,
            delta,
            now,
            Some(expires_at),
            correlation,
        );
        self.apply_tier(tiers);
        self.assert_invariants();
        Ok(entry)
    }

    /// Fails if crediting `points` would overflow the balance or the ledger.
    pub(crate) fn ensure_creditable(&self, points: u64) -> Result<(), LoyaltyError> {
        ledger_delta(points)?;
        checked_credit(self.balance, points)?;
        Ok(())
    }

    /// Fails with the shortfall if the balance does not cover `points`.
    pub(crate) fn ensure_covers(&self, points: u64) -> Result<(), LoyaltyError> {
        if self.balance < points {
            return Err(LoyaltyError::InsufficientPoints {
                points_needed: points - self.balance,
            });
        }
        Ok(())
    }

    /// Debits a redemption and appends a `Redeemed` entry.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn redeem(
        &mut self,
        id: EntryId,
        redemption_id: RedemptionId,
        reward_id: RewardId,
        points: u64,
        now: DateTime<Utc>,
        correlation: Correlation,
        tiers: &TierResolver,
    ) -> Result<LedgerEntry, LoyaltyError> {
        self.ensure_covers(points)?;
        let delta = ledger_delta(points)?;
        let total_redeemed = checked_credit(self.total_redeemed, points)?;

        self.balance -= points;
        self.total_redeemed = total_redeemed;
        self.redemptions.push(redemption_id);
        *self.redeemed_per_reward.entry(reward_id).or_insert(0) += 1;
        let entry = self.append(
            id,
            EntryType::Redeemed,
            -delta,
            now,
            None,
            correlation,
        );
        self.apply_tier(tiers);
        self.assert_invariants();
        Ok(entry)
    }

    /// Returns the points of a rejected redemption with an `Adjusted` entry.
    pub(crate) fn refund(
        &mut self,
        id: EntryId,
        reward_id: RewardId,
        points: u64,
        now: DateTime<Utc>,
        correlation: Correlation,
        tiers: &TierResolver,
    ) -> Result<LedgerEntry, LoyaltyError> {
        let delta = ledger_delta(points)?;
        let balance = checked_credit(self.balance, points)?;

        if let Some(count) = self.redeemed_per_reward.get_mut(&reward_id) {
            *count = count.saturating_sub(1);
        }
        self.balance = balance;
        let entry = self.append(
            id,
            EntryType::Adjusted,
            delta,
            now,
            None,
            correlation,
        );
        self.apply_tier(tiers);
        self.assert_invariants();
        Ok(entry)
    }

    /// Applies a manual correction. Negative deltas may not overdraw.
    pub(crate) fn adjust(
        &mut self,
        id: EntryId,
        delta: i64,
        now: DateTime<Utc>,
        correlation: Correlation,
        tiers: &TierResolver,
    ) -> Result<LedgerEntry, LoyaltyError> {
        if delta == 0 {
            return Err(LoyaltyError::InvalidAmount);
        }
        let magnitude = delta.unsigned_abs();
        if delta < 0 {
            self.ensure_covers(magnitude)?;
            self.balance -= magnitude;
        } else {
            self.balance = checked_credit(self.balance, magnitude)?;
        }
        let entry = self.append(id, EntryType::Adjusted, delta, now, None, correlation);
        self.apply_tier(tiers);
        self.assert_invariants();
        Ok(entry)
    }

    /// Indices of `Earned` entries due for expiry at `now`.
    pub(crate) fn due_entries(&self, now: DateTime<Utc>) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_due(now))
            .map(|(i, _)| i)
            .collect()
    }

    /// Expires the earned entry at `index`.
    ///
    /// The amount removed is bounded by the current balance, since earlier
    /// redemptions may already have consumed some of the entry's points.
    /// The earned entry is flagged even when nothing is left to remove; no
    /// zero-point `Expired` entry is written in that case. Returns `None`
    /// if the entry is not (or no longer) due.
    pub(crate) fn expire_entry(
        &mut self,
        index: usize,
        id: EntryId,
        now: DateTime<Utc>,
        tiers: &TierResolver,
    ) -> Option<ExpiredPoints> {
        let earned = self.entries.get(index).filter(|e| e.is_due(now))?;
        let earned_id = earned.id;
        // Bounded by the earned points, so it always fits a ledger delta.
        let points = i64::try_from(self.balance).map_or(earned.points, |b| b.min(earned.points));
        let amount = points.unsigned_abs();
        self.entries[index].is_expired = true;

        let entry = if amount > 0 {
            self.balance -= amount;
            let correlation = Correlation::described(format!("expiry of entry {earned_id}"));
            let entry = self.append(
                id,
                EntryType::Expired,
                -points,
                now,
                None,
                correlation,
            );
            self.apply_tier(tiers);
            Some(entry)
        } else {
            None
        };
        self.assert_invariants();

        Some(ExpiredPoints {
            earned_id,
            amount,
            entry,
        })
    }
}

/// Outcome of expiring one earned entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExpiredPoints {
    pub earned_id: EntryId,
    pub amount: u64,
    pub entry: Option<LedgerEntry>,
}

/// Point-in-time copy of an account's summary.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AccountSnapshot {
    pub customer_id: CustomerId,
    pub phone_number: String,
    pub balance: u64,
    pub total_earned: u64,
    pub total_redeemed: u64,
    pub tier: Tier,
    pub tier_status: TierStatus,
    pub last_earned_at: Option<DateTime<Utc>>,
    pub perks: Option<TierPerks>,
}

/// Per-customer loyalty account.
#[derive(Debug)]
pub struct LoyaltyAccount {
    inner: Mutex<AccountData>,
}

impl LoyaltyAccount {
    pub fn new(customer_id: CustomerId, phone_number: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(AccountData::new(customer_id, phone_number.into())),
        }
    }

    /// Exclusive access for a read-modify-write sequence.
    pub(crate) fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.inner.lock()
    }

    pub fn customer_id(&self) -> CustomerId {
        self.inner.lock().customer_id
    }

    pub fn phone_number(&self) -> String {
        self.inner.lock().phone_number.clone()
    }

    pub fn balance(&self) -> u64 {
        self.inner.lock().balance
    }

    pub fn total_earned(&self) -> u64 {
        self.inner.lock().total_earned
    }

    pub fn total_redeemed(&self) -> u64 {
        self.inner.lock().total_redeemed
    }

    pub fn tier(&self) -> Tier {
        self.inner.lock().tier
    }

    pub fn tier_status(&self) -> TierStatus {
        self.inner.lock().tier_status
    }

    pub fn last_earned_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_earned_at
    }

    /// Copy of the ledger, oldest first.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.inner.lock().entries.clone()
    }

    /// Sum of all ledger entry points. Always equals [`balance`](Self::balance).
    pub fn replay_balance(&self) -> i128 {
        self.inner.lock().replay_balance()
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let data = self.inner.lock();
        AccountSnapshot {
            customer_id: data.customer_id,
            phone_number: data.phone_number.clone(),
            balance: data.balance,
            total_earned: data.total_earned,
            total_redeemed: data.total_redeemed,
            tier: data.tier,
            tier_status: data.tier_status,
            last_earned_at: data.last_earned_at,
            perks: None,
        }
    }
}

impl Serialize for LoyaltyAccount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("LoyaltyAccount", 7)?;
        state.serialize_field("customer", &data.customer_id)?;
        state.serialize_field("phone", &data.phone_number)?;
        state.serialize_field("balance", &data.balance)?;
        state.serialize_field("total_earned", &data.total_earned)?;
        state.serialize_field("total_redeemed", &data.total_redeemed)?;
        state.serialize_field("tier", &data.tier)?;
        state.serialize_field("status", &data.tier_status)?;
        state.end()
    }
}
